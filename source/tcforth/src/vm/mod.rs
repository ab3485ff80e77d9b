use alloc::{
    string::{String, ToString},
    vec::Vec,
};
use core::str::FromStr;

use tracing::{debug, error, info, trace, warn};

use crate::{
    dictionary::{Dictionary, DisplayName},
    heap::Heap,
    input::WordStrBuf,
    output::OutputBuf,
    stack::Stack,
    word::{Addr, Codeword, Word, WORD_SIZE},
    Error, ForthParams, Mode,
};

mod bootstrap;
pub mod builtins;

pub use self::builtins::BuiltinEntry;

/// A native word. It has full access to the VM, including the heap and the
/// instruction pointer.
pub type WordFunc<T> = fn(&mut Forth<T>) -> Result<(), Error>;

/// Why [`Forth::run`] stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Halt {
    /// `interpret` ran out of tokens on the current line.
    InputExhausted,
    /// `bye` was executed.
    Bye,
    /// `word` or `'` reached the end of the line before finding a name. It
    /// runs again on the next line, and execution carries on from there.
    AwaitingInput,
}

#[derive(Debug, Clone, PartialEq)]
enum Status {
    Running,
    Terminated,
    Faulted(Error),
}

/// Forth is the "context" of the VM/interpreter.
pub struct Forth<T: 'static> {
    mode: Mode,
    pub data_stack: Stack<Word>,
    pub(crate) return_stack: Stack<Word>,
    pub(crate) heap: Heap,
    pub(crate) dict: Dictionary,
    pub input: WordStrBuf,
    pub output: OutputBuf,
    pub host_ctxt: T,
    natives: Vec<WordFunc<T>>,
    ip: Addr,
    halt: Option<Halt>,
    /// The native to re-run when the next line arrives.
    pending: Option<WordFunc<T>>,
    status: Status,
    /// First cell of `quit`'s call list.
    quit_start: Addr,
    /// Body of `lit`, compiled in front of every number literal.
    lit_body: Addr,
    word_buf: Addr,
    word_buf_len: usize,
}

impl<T: 'static> Forth<T> {
    /// Build a VM and run its startup source.
    ///
    /// `builtins` is usually [`Forth::FULL_BUILTINS`]; the kernel needs at
    /// least `interpret`, `branch` and `lit` to be present, plus everything
    /// the startup source uses.
    pub fn new(
        params: ForthParams,
        host_ctxt: T,
        builtins: &'static [BuiltinEntry<T>],
    ) -> Result<Self, Error> {
        let mut heap = Heap::new(params.heap_bytes);
        let word_buf = heap.allot(params.word_buf_elems)?;
        heap.align()?;

        let mut forth = Self {
            mode: Mode::Run,
            data_stack: Stack::new(params.data_stack_elems),
            return_stack: Stack::new(params.return_stack_elems),
            heap,
            dict: Dictionary::new(),
            input: WordStrBuf::new(params.input_buf_elems),
            output: OutputBuf::new(params.output_buf_elems),
            host_ctxt,
            natives: Vec::with_capacity(builtins.len()),
            ip: 0,
            halt: None,
            pending: None,
            status: Status::Running,
            quit_start: 0,
            lit_body: 0,
            word_buf,
            word_buf_len: params.word_buf_elems,
        };

        for bi in builtins {
            forth.add_native(bi.name.as_bytes(), bi.func, bi.immediate, bi.compile_only)?;
        }
        forth.lit_body = forth.body_of(b"lit")?;
        forth.quit_start = forth.build_quit()?;
        forth.bootstrap()?;

        info!(
            natives = forth.natives.len(),
            heap_used = forth.heap.used(),
            heap_free = forth.heap.free(),
            "forth VM ready"
        );
        Ok(forth)
    }

    /// Give back the host context, dropping the VM.
    pub fn release(self) -> T {
        self.host_ctxt
    }

    /// Register a new native word. It shadows any existing word of the same
    /// name from here on.
    pub fn add_builtin(&mut self, name: &str, bi: WordFunc<T>) -> Result<(), Error> {
        self.add_native(name.as_bytes(), bi, false, false)
    }

    fn add_native(
        &mut self,
        name: &[u8],
        func: WordFunc<T>,
        immediate: bool,
        compile_only: bool,
    ) -> Result<(), Error> {
        let id = u32::try_from(self.natives.len())
            .map_err(|_| Error::UsizeToWordInvalid(self.natives.len()))?;
        let entry = self.dict.define(&mut self.heap, name, immediate)?;
        if compile_only {
            self.dict.toggle_compile_only(&mut self.heap, entry)?;
        }
        self.heap.append_word(Codeword::Native(id).to_cell())?;
        self.natives.push(func);
        Ok(())
    }

    /// `quit` is the outer loop: `interpret` the next token, then branch
    /// back. It is the only composite word assembled from Rust.
    fn build_quit(&mut self) -> Result<Addr, Error> {
        let interpret = Word::try_from(self.body_of(b"interpret")?)?;
        let branch = Word::try_from(self.body_of(b"branch")?)?;

        self.dict.define(&mut self.heap, b"quit", false)?;
        self.heap.append_word(Codeword::Enter.to_cell())?;
        let start = self.heap.append_word(interpret.into_data())?;
        self.heap.append_word(branch.into_data())?;
        let offset_cell = self.heap.here();
        let back = -(Word::try_from(offset_cell - start)?.into_data());
        self.heap.append_word(back)?;
        Ok(start)
    }

    fn body_of(&self, name: &[u8]) -> Result<Addr, Error> {
        let entry = self
            .dict
            .lookup(&self.heap, name)?
            .ok_or_else(|| Error::WordNotInDict(lossy(name)))?;
        self.dict.body_address(&self.heap, entry)
    }

    /// Interpret whatever is currently in [`Forth::input`].
    ///
    /// Appends `ok.` to the output when the line is used up. A line that
    /// ends while `word` or `'` still waits for a name adds nothing, and the
    /// next call picks up where this one stopped. A fatal error leaves the
    /// VM faulted, and every later call returns [`Error::Halted`]; so does
    /// any call after `bye`.
    #[tracing::instrument(level = "debug", skip(self), fields(depth = self.data_stack.depth()))]
    pub fn process_line(&mut self) -> Result<(), Error> {
        if self.status != Status::Running {
            return Err(Error::Halted);
        }
        self.halt = None;

        let res = match self.pending.take() {
            // `ip` and the return stack are exactly as the last line left them.
            Some(resume) => {
                debug!(ip = self.ip, rdepth = self.return_stack.depth(), "resuming");
                resume(self).and_then(|()| self.run())
            }
            // Cold start: jump straight into `quit` with nothing to return to.
            None => {
                self.return_stack.clear();
                self.ip = self.quit_start;
                self.run()
            }
        };

        let res = match res {
            Ok(Halt::InputExhausted) => self.output.push_str("ok.\n").map_err(Error::from),
            Ok(Halt::AwaitingInput) => Ok(()),
            Ok(Halt::Bye) => {
                debug!("bye");
                self.status = Status::Terminated;
                Ok(())
            }
            Err(e) => Err(e),
        };

        if let Err(e) = &res {
            error!(error = %e, ip = self.ip, "forth VM faulted");
            self.status = Status::Faulted(e.clone());
        }
        res
    }

    /// Step until something halts the inner interpreter.
    pub fn run(&mut self) -> Result<Halt, Error> {
        loop {
            if let Some(halt) = self.halt.take() {
                return Ok(halt);
            }
            self.step()?;
        }
    }

    /// Execute the word whose address is in the cell at `ip`.
    pub fn step(&mut self) -> Result<(), Error> {
        let cfa = Word::data(self.heap.read_word(self.ip)?).into_addr()?;
        self.ip += WORD_SIZE;
        self.dispatch(cfa)
    }

    /// Execute the word with body address `cfa`, according to its codeword.
    pub fn dispatch(&mut self, cfa: Addr) -> Result<(), Error> {
        match self.native_at(cfa)? {
            None => self.enter(cfa),
            Some(func) => {
                trace!(cfa, "native");
                func(self)
            }
        }
    }

    /// Save the resume point and start on the call list following `cfa`.
    pub fn enter(&mut self, cfa: Addr) -> Result<(), Error> {
        trace!(cfa, ret = self.ip, "enter");
        let ret = Word::try_from(self.ip)?;
        self.return_stack.push(ret).map_err(Error::return_stack)?;
        self.ip = cfa + WORD_SIZE;
        Ok(())
    }

    /// Resume the caller.
    pub fn leave(&mut self) -> Result<(), Error> {
        let ret = self.return_stack.try_pop().map_err(Error::return_stack)?;
        self.ip = ret.into_addr()?;
        Ok(())
    }

    /// `None` for composite words.
    fn native_at(&self, cfa: Addr) -> Result<Option<WordFunc<T>>, Error> {
        let cell = self.heap.read_word(cfa)?;
        match Codeword::from_cell(cell)? {
            Codeword::Enter => Ok(None),
            Codeword::Native(id) => self
                .natives
                .get(id as usize)
                .copied()
                .map(Some)
                .ok_or(Error::BadCodeword(cell)),
        }
    }

    /// Stop here and call `func` again once the next line is filled in.
    pub(crate) fn await_input(&mut self, func: WordFunc<T>) -> Result<(), Error> {
        debug!(ip = self.ip, "waiting for the next line");
        self.pending = Some(func);
        self.halt = Some(Halt::AwaitingInput);
        Ok(())
    }

    /// One turn of the outer interpreter: execute, compile, or push the next
    /// token. Unknown tokens are reported to the output and skipped.
    pub fn interpret_one_token(&mut self) -> Result<(), Error> {
        self.input.advance();
        let token = match self.input.cur_word() {
            Some(t) => t,
            None => {
                self.halt = Some(Halt::InputExhausted);
                return Ok(());
            }
        };

        let res = match self.dict.lookup(&self.heap, token)? {
            Some(entry) => self.interpret_entry(entry),
            None => match parse_num(token) {
                Some(val) => self.interpret_literal(val),
                None => Err(Error::UnknownWordOrLiteral(lossy(token))),
            },
        };

        match res {
            Err(e) if e.is_recoverable() => self.report(&e),
            res => res,
        }
    }

    fn interpret_entry(&mut self, entry: Addr) -> Result<(), Error> {
        let hdr = self.dict.header(&self.heap, entry)?;
        let cfa = self.dict.body_address(&self.heap, entry)?;

        if self.mode == Mode::Compile && !hdr.immediate {
            return self.compile_addr(cfa);
        }
        if self.mode == Mode::Run && hdr.compile_only {
            let name = lossy(self.dict.name(&self.heap, entry)?);
            return Err(Error::InterpretingCompileOnlyWord(name));
        }
        self.dispatch(cfa)
    }

    fn interpret_literal(&mut self, val: i64) -> Result<(), Error> {
        match self.mode {
            Mode::Run => self.push(Word::data(val)),
            Mode::Compile => {
                self.compile_addr(self.lit_body)?;
                self.heap.append_word(val)?;
                Ok(())
            }
        }
    }

    fn report(&mut self, err: &Error) -> Result<(), Error> {
        warn!(error = %err, "skipping token");
        let token = match err {
            Error::UnknownWordOrLiteral(t) | Error::InterpretingCompileOnlyWord(t) => t.as_str(),
            _ => "",
        };
        self.output.push_str(token)?;
        self.output.push_str(" ? ")?;
        Ok(())
    }

    /// Append a body address to the definition being compiled.
    pub fn compile_addr(&mut self, cfa: Addr) -> Result<(), Error> {
        self.heap.append_word(Word::try_from(cfa)?.into_data())?;
        Ok(())
    }

    /// The entry address of the visible word named `name`, if there is one.
    pub fn lookup(&self, name: &str) -> Result<Option<Addr>, Error> {
        self.dict.lookup(&self.heap, name.as_bytes())
    }

    #[inline]
    pub fn push(&mut self, w: Word) -> Result<(), Error> {
        self.data_stack.push(w).map_err(Error::data_stack)
    }

    #[inline]
    pub fn pop(&mut self) -> Result<Word, Error> {
        self.data_stack.try_pop().map_err(Error::data_stack)
    }

    #[inline]
    pub fn peek(&self) -> Result<Word, Error> {
        self.data_stack.try_peek().map_err(Error::data_stack)
    }

    #[inline]
    pub fn mode(&self) -> Mode {
        self.mode
    }

    #[inline]
    pub(crate) fn set_mode(&mut self, mode: Mode) {
        trace!(?mode, "mode");
        self.mode = mode;
    }

    #[inline]
    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    #[inline]
    pub fn dictionary(&self) -> &Dictionary {
        &self.dict
    }

    #[inline]
    pub fn return_depth(&self) -> usize {
        self.return_stack.depth()
    }

    /// `bye` has been executed.
    pub fn is_terminated(&self) -> bool {
        self.status == Status::Terminated
    }

    /// The fatal error that stopped the VM, if any.
    pub fn fault(&self) -> Option<&Error> {
        match &self.status {
            Status::Faulted(e) => Some(e),
            _ => None,
        }
    }
}

/// The whole token must be a decimal `i64`.
fn parse_num(token: &[u8]) -> Option<i64> {
    core::str::from_utf8(token).ok().and_then(|s| i64::from_str(s).ok())
}

fn lossy(bytes: &[u8]) -> String {
    DisplayName(bytes).to_string()
}

#[cfg(test)]
pub mod test {
    use crate::{
        testutil::blocking_runtest,
        word::{Codeword, Word, WORD_SIZE},
        Error, Forth, ForthParams, Mode,
    };

    fn vm() -> Forth<()> {
        Forth::new(ForthParams::default(), (), Forth::FULL_BUILTINS).unwrap()
    }

    fn line(forth: &mut Forth<()>, src: &str) -> Result<String, Error> {
        forth.output.clear();
        forth.input.fill(src).unwrap();
        forth.process_line()?;
        Ok(forth.output.as_str().to_string())
    }

    #[test]
    fn startup_defines_the_kernel() {
        let forth = vm();
        for name in [
            ":", ";", "literal", "quit", "if", "else", "then", "begin", "until", "again",
            "constant", "variable",
        ] {
            let entry = forth.lookup(name).unwrap();
            assert!(entry.is_some(), "{name} missing");
        }
        assert_eq!(forth.mode(), Mode::Run);
        assert!(forth.data_stack.is_empty());
        assert_eq!(forth.output.as_str(), "");
        assert!(forth.fault().is_none());

        // `:` and `;` are composite words, `dup` is native
        let colon = forth.lookup(":").unwrap().unwrap();
        let body = forth.dict.body_address(&forth.heap, colon).unwrap();
        assert_eq!(
            Codeword::from_cell(forth.heap.read_word(body).unwrap()).unwrap(),
            Codeword::Enter
        );
        let semi = forth.lookup(";").unwrap().unwrap();
        assert!(forth.dict.is_immediate(&forth.heap, semi).unwrap());
        assert!(forth.dict.is_compile_only(&forth.heap, semi).unwrap());
        let dup = forth.lookup("dup").unwrap().unwrap();
        let body = forth.dict.body_address(&forth.heap, dup).unwrap();
        assert!(matches!(
            Codeword::from_cell(forth.heap.read_word(body).unwrap()).unwrap(),
            Codeword::Native(_)
        ));
    }

    #[test]
    fn quit_loops_back_to_interpret() {
        let forth = vm();
        let quit = forth.lookup("quit").unwrap().unwrap();
        let body = forth.dict.body_address(&forth.heap, quit).unwrap();
        let interpret = forth.body_of(b"interpret").unwrap();
        let branch = forth.body_of(b"branch").unwrap();

        let cell = |n: usize| forth.heap.read_word(body + n * WORD_SIZE).unwrap();
        assert_eq!(cell(0), Codeword::Enter.to_cell());
        assert_eq!(cell(1), interpret as i64);
        assert_eq!(cell(2), branch as i64);
        assert_eq!(cell(3), -2 * WORD_SIZE as i64);
    }

    #[test]
    fn compiles_a_double() {
        let mut forth = vm();
        assert_eq!(line(&mut forth, ": double dup + ;").unwrap(), "ok.\n");

        let entry = forth.lookup("double").unwrap().unwrap();
        let body = forth.dict.body_address(&forth.heap, entry).unwrap();
        let expected = [
            Codeword::Enter.to_cell(),
            forth.body_of(b"dup").unwrap() as i64,
            forth.body_of(b"+").unwrap() as i64,
            forth.body_of(b"exit").unwrap() as i64,
        ];
        for (i, exp) in expected.iter().enumerate() {
            assert_eq!(forth.heap.read_word(body + i * WORD_SIZE).unwrap(), *exp);
        }
        assert_eq!(forth.heap.here(), body + expected.len() * WORD_SIZE);

        assert_eq!(line(&mut forth, "5 double").unwrap(), "ok.\n");
        assert_eq!(forth.data_stack.as_slice(), &[Word::data(10)]);
    }

    #[test]
    fn literals_compile_through_lit() {
        let mut forth = vm();
        line(&mut forth, ": five 5 ;").unwrap();
        let entry = forth.lookup("five").unwrap().unwrap();
        let body = forth.dict.body_address(&forth.heap, entry).unwrap();
        assert_eq!(
            forth.heap.read_word(body + WORD_SIZE).unwrap(),
            forth.body_of(b"lit").unwrap() as i64
        );
        assert_eq!(forth.heap.read_word(body + 2 * WORD_SIZE).unwrap(), 5);

        line(&mut forth, "five five +").unwrap();
        assert_eq!(forth.data_stack.as_slice(), &[Word::data(10)]);
    }

    #[test]
    fn unknown_tokens_are_skipped() {
        let mut forth = vm();
        line(&mut forth, "1 2").unwrap();
        let here = forth.heap.here();
        assert_eq!(line(&mut forth, "abc 3").unwrap(), "abc ? ok.\n");
        assert_eq!(
            forth.data_stack.as_slice(),
            &[Word::data(1), Word::data(2), Word::data(3)]
        );
        assert_eq!(forth.heap.here(), here);
        assert!(forth.fault().is_none());

        // not numbers either
        assert_eq!(line(&mut forth, "12abc 0x10").unwrap(), "12abc ? 0x10 ? ok.\n");
    }

    #[test]
    fn compile_only_words_are_rejected_at_top_level() {
        let mut forth = vm();
        assert_eq!(line(&mut forth, "lit 4").unwrap(), "lit ? ok.\n");
        assert_eq!(forth.data_stack.as_slice(), &[Word::data(4)]);
        assert_eq!(line(&mut forth, "branch 0branch").unwrap(), "branch ? 0branch ? ok.\n");
    }

    #[test]
    fn top_level_exit_faults() {
        let mut forth = vm();
        assert_eq!(line(&mut forth, "exit"), Err(Error::ReturnStackUnderflow));
        assert_eq!(forth.fault(), Some(&Error::ReturnStackUnderflow));
        assert_eq!(line(&mut forth, "1"), Err(Error::Halted));
    }

    #[test]
    fn bye_terminates() {
        let mut forth = vm();
        assert_eq!(line(&mut forth, "1 . bye 2 .").unwrap(), "1 ");
        assert!(forth.is_terminated());
        assert_eq!(line(&mut forth, "3 ."), Err(Error::Halted));
    }

    #[test]
    fn stack_stays_balanced() {
        let mut forth = vm();
        line(&mut forth, ": sq dup * ;").unwrap();
        for _ in 0..1000 {
            line(&mut forth, "7 sq drop").unwrap();
        }
        assert!(forth.data_stack.is_empty());
        assert_eq!(forth.return_depth(), 0);
    }

    #[test]
    fn bad_codeword_faults() {
        let mut forth = vm();
        // `here` points at a zero cell, which is not a codeword
        let here = forth.heap.here();
        assert_eq!(forth.dispatch(here), Err(Error::BadCodeword(0)));
    }

    #[test]
    fn add_builtin() {
        fn squirrel(forth: &mut Forth<Vec<i64>>) -> Result<(), Error> {
            let val = forth.pop()?;
            forth.host_ctxt.push(val.into_data());
            Ok(())
        }

        let mut forth = Forth::new(ForthParams::default(), Vec::new(), Forth::FULL_BUILTINS).unwrap();
        forth.add_builtin("squirrel", squirrel).unwrap();
        forth.input.fill("1 squirrel : more 2 squirrel 3 squirrel ; more").unwrap();
        forth.process_line().unwrap();
        assert_eq!(forth.output.as_str(), "ok.\n");
        assert_eq!(forth.release(), vec![1, 2, 3]);
    }

    #[test]
    fn words() {
        blocking_runtest(
            r#"
            > : double dup + ;
            > 5 double .
            < 10 ok.
            > 1 2 3 rot . . .
            < 1 3 2 ok.
            > 10 3 mod . 10 3 / . -7 2 - .
            < 1 3 -9 ok.
            > 3 4 < . 3 4 > . 4 4 = . 0 not . 5 not .
            < -1 0 -1 -1 0 ok.
            > 1 2 over . . . 1 2 swap . .
            < 1 2 1 1 2 ok.
            > 72 emit 105 emit cr
            < Hi
            < ok.
            "#,
        );
    }

    #[test]
    fn control_flow() {
        blocking_runtest(
            r#"
            > : sign dup 0 < if drop -1 else 0 > if 1 else 0 then then ;
            > -5 sign . 0 sign . 9 sign .
            < -1 0 1 ok.
            > : countdown begin dup . 1 - dup 0 = until drop ;
            > 3 countdown
            < 3 2 1 ok.
            > : fact dup 1 > if dup 1 - recurse * then ;
            > 5 fact .
            < 120 ok.
            > 42 constant answer
            > answer answer + .
            < 84 ok.
            > variable counter
            > counter @ .
            < 0 ok.
            > 5 counter ! counter @ counter @ + .
            < 10 ok.
            "#,
        );
    }

    #[test]
    fn immediate_brackets() {
        blocking_runtest(
            r#"
            > : three [ 1 2 + ] literal ;
            > three .
            < 3 ok.
            > : noisy 1 . ; immediate
            > : quiet noisy ;
            < 1 ok.
            > quiet
            < ok.
            "#,
        );
    }

    #[test]
    fn definitions_span_lines() {
        blocking_runtest(
            r#"
            > :
            > sq dup * ;
            < ok.
            > 3 sq .
            < 9 ok.
            > : cube
            < ok.
            > dup sq
            > * ;
            > 2 cube .
            < 8 ok.
            > : dup-addr [ '
            > dup ] literal ;
            > dup-addr ' dup = .
            < -1 ok.
            "#,
        );
    }

    #[test]
    fn resuming_keeps_the_call_chain() {
        let mut forth = vm();
        assert_eq!(line(&mut forth, "7 :").unwrap(), "");
        // `:` is suspended inside its own body, under `quit`
        assert_eq!(forth.return_depth(), 1);
        assert_eq!(forth.mode(), Mode::Run);

        assert_eq!(line(&mut forth, "seven").unwrap(), "ok.\n");
        assert_eq!(forth.mode(), Mode::Compile);
        assert_eq!(forth.return_depth(), 0);
        assert_eq!(line(&mut forth, "literal ; seven .").unwrap(), "7 ok.\n");
        assert!(forth.fault().is_none());
    }

    #[test]
    fn definitions_are_hidden_until_finished() {
        blocking_runtest(
            r#"
            > : foo 100 ;
            > : foo foo 1 + ;
            > foo .
            < 101 ok.
            "#,
        );
    }

    #[test]
    fn runaway_recursion_faults() {
        let mut forth = vm();
        line(&mut forth, ": forever recurse ;").unwrap();
        assert_eq!(line(&mut forth, "forever"), Err(Error::ReturnStackOverflow));
        assert!(forth.fault().is_some());
    }

    #[test]
    fn division_by_zero_faults() {
        let mut forth = vm();
        assert_eq!(line(&mut forth, "1 0 /"), Err(Error::DivideByZero));
    }
}
