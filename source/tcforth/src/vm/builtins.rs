use crate::{
    vm::{lossy, Halt, WordFunc},
    word::{Codeword, Word, WORD_SIZE},
    Error, Forth, Mode,
};

/// A native word provided when the VM is built.
pub struct BuiltinEntry<T: 'static> {
    pub name: &'static str,
    pub func: WordFunc<T>,
    /// Executed even while compiling.
    pub immediate: bool,
    /// Only usable inside a definition. The interpreter refuses to execute
    /// it directly, since it reads its operand from the following cell.
    pub compile_only: bool,
}

// NOTE: This macro exists because we can't have const constructors that include
// "mut" items, which unfortunately covers things like `fn(&mut T)`. Use a macro
// until this is resolved.
macro_rules! builtin {
    (immediate $name:literal, $func:expr) => {
        BuiltinEntry {
            name: $name,
            func: $func,
            immediate: true,
            compile_only: false,
        }
    };
    (compile_only $name:literal, $func:expr) => {
        BuiltinEntry {
            name: $name,
            func: $func,
            immediate: false,
            compile_only: true,
        }
    };
    ($name:literal, $func:expr) => {
        BuiltinEntry {
            name: $name,
            func: $func,
            immediate: false,
            compile_only: false,
        }
    };
}

impl<T: 'static> Forth<T> {
    pub const FULL_BUILTINS: &'static [BuiltinEntry<T>] = &[
        //
        // inner interpreter
        //
        builtin!("exit", Self::exit),
        builtin!(compile_only "lit", Self::lit),
        builtin!(compile_only "branch", Self::branch),
        builtin!(compile_only "0branch", Self::zero_branch),
        builtin!("interpret", Self::interpret),
        builtin!("bye", Self::bye),
        //
        // compiler
        //
        builtin!(immediate "[", Self::lbracket),
        builtin!("]", Self::rbracket),
        builtin!(",", Self::comma),
        builtin!("here", Self::here),
        builtin!("latest", Self::latest),
        builtin!("hidden", Self::hidden),
        builtin!(immediate "immediate", Self::immediate),
        builtin!("compile-only", Self::compile_only),
        builtin!(immediate "recurse", Self::recurse),
        builtin!("docol", Self::docol),
        builtin!("'", Self::tick),
        builtin!("word", Self::word),
        builtin!("create", Self::create),
        //
        // memory
        //
        builtin!("@", Self::fetch),
        builtin!("!", Self::store),
        builtin!("c@", Self::byte_fetch),
        builtin!("c!", Self::byte_store),
        //
        // stack
        //
        builtin!("dup", Self::dup),
        builtin!("drop", Self::drop),
        builtin!("swap", Self::swap),
        builtin!("over", Self::over),
        builtin!("rot", Self::rot),
        builtin!(">r", Self::data_to_return_stack),
        builtin!("r>", Self::return_to_data_stack),
        //
        // math
        //
        builtin!("+", Self::add),
        builtin!("-", Self::minus),
        builtin!("*", Self::mul),
        builtin!("/", Self::div),
        builtin!("mod", Self::modu),
        builtin!("=", Self::equal),
        builtin!("<", Self::less),
        builtin!(">", Self::greater),
        builtin!("not", Self::invert),
        //
        // io
        //
        builtin!(".", Self::pop_print),
        builtin!("emit", Self::emit),
        builtin!("cr", Self::cr),
        builtin!("info", Self::info),
    ];

    pub fn exit(&mut self) -> Result<(), Error> {
        self.leave()
    }

    /// Push the cell following this one, and skip over it.
    pub fn lit(&mut self) -> Result<(), Error> {
        let val = self.heap.read_word(self.ip)?;
        self.ip += WORD_SIZE;
        self.push(Word::data(val))
    }

    /// Jump by the byte offset in the following cell, relative to that cell.
    pub fn branch(&mut self) -> Result<(), Error> {
        let offset = self.heap.read_word(self.ip)?;
        self.ip = isize::try_from(offset)
            .ok()
            .and_then(|off| self.ip.checked_add_signed(off))
            .ok_or(Error::WordToUsizeInvalid(offset))?;
        Ok(())
    }

    pub fn zero_branch(&mut self) -> Result<(), Error> {
        if self.pop()?.into_data() == 0 {
            self.branch()
        } else {
            self.ip += WORD_SIZE;
            Ok(())
        }
    }

    pub fn interpret(&mut self) -> Result<(), Error> {
        self.interpret_one_token()
    }

    pub fn bye(&mut self) -> Result<(), Error> {
        self.halt = Some(Halt::Bye);
        Ok(())
    }

    pub fn lbracket(&mut self) -> Result<(), Error> {
        self.set_mode(Mode::Run);
        Ok(())
    }

    pub fn rbracket(&mut self) -> Result<(), Error> {
        self.set_mode(Mode::Compile);
        Ok(())
    }

    pub fn comma(&mut self) -> Result<(), Error> {
        let w = self.pop()?;
        self.heap.append_word(w.into_data())?;
        Ok(())
    }

    pub fn here(&mut self) -> Result<(), Error> {
        let here = Word::try_from(self.heap.here())?;
        self.push(here)
    }

    /// Pushes 0 while the dictionary is empty.
    pub fn latest(&mut self) -> Result<(), Error> {
        let latest = self.dict.latest().unwrap_or(0);
        self.push(Word::try_from(latest)?)
    }

    /// Toggle the hidden flag of the entry on top of the stack.
    pub fn hidden(&mut self) -> Result<(), Error> {
        let entry = self.pop()?.into_addr()?;
        self.dict.toggle_hidden(&mut self.heap, entry)
    }

    /// Toggle the immediate flag of the latest entry.
    pub fn immediate(&mut self) -> Result<(), Error> {
        let latest = self.dict.latest().ok_or(Error::NoLatestWord)?;
        self.dict.toggle_immediate(&mut self.heap, latest)
    }

    /// Toggle the compile-only flag of the latest entry.
    pub fn compile_only(&mut self) -> Result<(), Error> {
        let latest = self.dict.latest().ok_or(Error::NoLatestWord)?;
        self.dict.toggle_compile_only(&mut self.heap, latest)
    }

    /// Compile a call to the word being defined, hidden or not.
    pub fn recurse(&mut self) -> Result<(), Error> {
        let latest = self.dict.latest().ok_or(Error::NoLatestWord)?;
        let cfa = self.dict.body_address(&self.heap, latest)?;
        self.compile_addr(cfa)
    }

    pub fn docol(&mut self) -> Result<(), Error> {
        self.push(Word::data(Codeword::Enter.to_cell()))
    }

    /// Push the body address of the next word in the input.
    pub fn tick(&mut self) -> Result<(), Error> {
        self.input.advance();
        let name = match self.input.cur_word() {
            Some(name) => name,
            None => return self.await_input(Self::tick),
        };
        let entry = self
            .dict
            .lookup(&self.heap, name)?
            .ok_or_else(|| Error::WordNotInDict(lossy(name)))?;
        let cfa = self.dict.body_address(&self.heap, entry)?;
        self.push(Word::try_from(cfa)?)
    }

    /// ( -- addr len ) Copy the next word of the input into the word buffer.
    ///
    /// At the end of a line this waits for the next one.
    pub fn word(&mut self) -> Result<(), Error> {
        self.input.advance();
        let name = match self.input.cur_word() {
            Some(name) => name,
            None => return self.await_input(Self::word),
        };
        if name.len() > self.word_buf_len {
            return Err(Error::WordTooLong {
                len: name.len(),
                max: self.word_buf_len,
            });
        }
        self.heap.write_bytes(self.word_buf, name)?;
        let len = Word::try_from(name.len())?;
        self.push(Word::try_from(self.word_buf)?)?;
        self.push(len)
    }

    /// ( addr len -- ) Start a new dictionary entry named by the given bytes.
    pub fn create(&mut self) -> Result<(), Error> {
        let len = usize::try_from(self.pop()?)?;
        let addr = self.pop()?.into_addr()?;
        let name = self.heap.read_bytes(addr, len)?.to_vec();
        self.dict.define(&mut self.heap, &name, false)?;
        Ok(())
    }

    pub fn fetch(&mut self) -> Result<(), Error> {
        let addr = self.pop()?.into_addr()?;
        let val = self.heap.read_word(addr)?;
        self.push(Word::data(val))
    }

    /// ( x addr -- )
    pub fn store(&mut self) -> Result<(), Error> {
        let addr = self.pop()?.into_addr()?;
        let val = self.pop()?;
        self.heap.write_word(addr, val.into_data())?;
        Ok(())
    }

    pub fn byte_fetch(&mut self) -> Result<(), Error> {
        let addr = self.pop()?.into_addr()?;
        let val = self.heap.read_byte(addr)?;
        self.push(Word::data(i64::from(val)))
    }

    /// ( c addr -- ) Only the low byte of `c` is stored.
    pub fn byte_store(&mut self) -> Result<(), Error> {
        let addr = self.pop()?.into_addr()?;
        let val = self.pop()?.into_data();
        self.heap.write_byte(addr, val as u8)?;
        Ok(())
    }

    pub fn dup(&mut self) -> Result<(), Error> {
        let val = self.peek()?;
        self.push(val)
    }

    pub fn drop(&mut self) -> Result<(), Error> {
        let _ = self.pop()?;
        Ok(())
    }

    pub fn swap(&mut self) -> Result<(), Error> {
        let a = self.pop()?;
        let b = self.pop()?;
        self.push(a)?;
        self.push(b)
    }

    pub fn over(&mut self) -> Result<(), Error> {
        let a = self
            .data_stack
            .try_peek_back_n(1)
            .map_err(Error::data_stack)?;
        self.push(a)
    }

    /// ( a b c -- b c a )
    pub fn rot(&mut self) -> Result<(), Error> {
        let c = self.pop()?;
        let b = self.pop()?;
        let a = self.pop()?;
        self.push(b)?;
        self.push(c)?;
        self.push(a)
    }

    pub fn data_to_return_stack(&mut self) -> Result<(), Error> {
        let val = self.pop()?;
        self.return_stack.push(val).map_err(Error::return_stack)
    }

    pub fn return_to_data_stack(&mut self) -> Result<(), Error> {
        let val = self.return_stack.try_pop().map_err(Error::return_stack)?;
        self.push(val)
    }

    fn binop(&mut self, f: impl FnOnce(i64, i64) -> Result<i64, Error>) -> Result<(), Error> {
        let b = self.pop()?.into_data();
        let a = self.pop()?.into_data();
        self.push(Word::data(f(a, b)?))
    }

    pub fn add(&mut self) -> Result<(), Error> {
        self.binop(|a, b| Ok(a.wrapping_add(b)))
    }

    pub fn minus(&mut self) -> Result<(), Error> {
        self.binop(|a, b| Ok(a.wrapping_sub(b)))
    }

    pub fn mul(&mut self) -> Result<(), Error> {
        self.binop(|a, b| Ok(a.wrapping_mul(b)))
    }

    pub fn div(&mut self) -> Result<(), Error> {
        self.binop(|a, b| match b {
            0 => Err(Error::DivideByZero),
            b => Ok(a.wrapping_div(b)),
        })
    }

    pub fn modu(&mut self) -> Result<(), Error> {
        self.binop(|a, b| match b {
            0 => Err(Error::DivideByZero),
            b => Ok(a.wrapping_rem(b)),
        })
    }

    pub fn equal(&mut self) -> Result<(), Error> {
        self.binop(|a, b| Ok(Word::flag(a == b).into_data()))
    }

    pub fn less(&mut self) -> Result<(), Error> {
        self.binop(|a, b| Ok(Word::flag(a < b).into_data()))
    }

    pub fn greater(&mut self) -> Result<(), Error> {
        self.binop(|a, b| Ok(Word::flag(a > b).into_data()))
    }

    pub fn invert(&mut self) -> Result<(), Error> {
        let a = self.pop()?.into_data();
        self.push(Word::flag(a == 0))
    }

    pub fn pop_print(&mut self) -> Result<(), Error> {
        let a = self.pop()?.into_data();
        self.output.push_fmt(format_args!("{a} "))?;
        Ok(())
    }

    pub fn emit(&mut self) -> Result<(), Error> {
        let val = self.pop()?.into_data();
        self.output.push_bstr(&[val as u8])?;
        Ok(())
    }

    pub fn cr(&mut self) -> Result<(), Error> {
        self.output.push_bstr(b"\n")?;
        Ok(())
    }

    /// Dump the visible words, heap usage and the data stack.
    pub fn info(&mut self) -> Result<(), Error> {
        self.output.push_str("words:")?;
        for entry in self.dict.entries(&self.heap) {
            let (addr, hdr) = entry?;
            if hdr.hidden {
                continue;
            }
            self.output.push_str(" ")?;
            self.output.push_bstr(self.dict.name(&self.heap, addr)?)?;
        }
        self.output.push_fmt(format_args!(
            "\nheap: {} of {} bytes used\n",
            self.heap.used(),
            self.heap.capacity()
        ))?;
        self.output
            .push_fmt(format_args!("stack: <{}>", self.data_stack.depth()))?;
        for w in self.data_stack.as_slice() {
            self.output.push_fmt(format_args!(" {}", w.into_data()))?;
        }
        self.output.push_str("\n")?;
        Ok(())
    }
}
