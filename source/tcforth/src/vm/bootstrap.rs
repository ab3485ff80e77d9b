//! Forth source interpreted by every new VM.
//!
//! The kernel lines can't use `:` yet, so they assemble `:`, `;` and
//! `literal` by hand: `word` + `create` start an entry, `docol ,` writes
//! the codeword, and `' x ,` appends calls one at a time.

use tracing::debug;

use crate::{Error, Forth};

const KERNEL: &[&str] = &[
    // : ( "name" -- ) start a hidden definition and switch to compiling
    "word : create docol , ' word , ' create , ' lit , docol , ' , , ' latest , ' hidden , ' ] , ' exit ,",
    // ; unhide the definition, finish it with `exit` and stop compiling.
    // Outside a definition it would hide whatever word came last.
    "word ; create docol , ' lit , ' exit , ' , , ' latest , ' hidden , ' [ , ' exit , immediate compile-only",
    // literal ( x -- ) compile x as a literal
    "word literal create docol , ' lit , ' lit , ' , , ' , , ' exit , immediate",
];

/// Control words leave the address of their forward-branch offset cell on
/// the stack while compiling, and `then` patches it.
const PRELUDE: &[&str] = &[
    ": if [ ' 0branch ] literal , here 0 , ; immediate",
    ": else [ ' branch ] literal , here 0 , swap dup here swap - swap ! ; immediate",
    ": then dup here swap - swap ! ; immediate",
    ": begin here ; immediate",
    ": until [ ' 0branch ] literal , here - , ; immediate",
    ": again [ ' branch ] literal , here - , ; immediate",
    ": constant word create docol , [ ' lit ] literal , , [ ' exit ] literal , ;",
    ": variable here 0 , word create docol , [ ' lit ] literal , , [ ' exit ] literal , ;",
];

impl<T: 'static> Forth<T> {
    pub(super) fn bootstrap(&mut self) -> Result<(), Error> {
        for line in KERNEL.iter().chain(PRELUDE) {
            self.input.fill(line)?;
            self.process_line()?;
            debug!(line, output = self.output.as_str(), "bootstrapped");
            self.output.clear();
        }
        Ok(())
    }
}

#[cfg(test)]
pub mod test {
    use super::{KERNEL, PRELUDE};
    use crate::{
        testutil::{blocking_runtest, blocking_runtest_with},
        Forth, ForthParams,
    };

    #[test]
    fn prelude_compiles_cleanly() {
        let mut forth = Forth::new(ForthParams::default(), (), Forth::FULL_BUILTINS).unwrap();
        assert_eq!(forth.output.as_str(), "");
        for line in KERNEL.iter().chain(PRELUDE) {
            forth.input.fill(line).unwrap();
            forth.process_line().unwrap();
            // no unknown words anywhere
            assert_eq!(forth.output.as_str(), "ok.\n", "{line}");
            assert!(forth.data_stack.is_empty(), "{line}");
            forth.output.clear();
        }
    }

    #[test]
    fn too_small_to_boot() {
        let params = ForthParams {
            heap_bytes: 512,
            ..ForthParams::default()
        };
        assert!(Forth::new(params, (), Forth::FULL_BUILTINS).is_err());
    }

    #[test]
    fn stray_semicolon_is_refused() {
        let mut forth = Forth::new(ForthParams::default(), (), Forth::FULL_BUILTINS).unwrap();
        let here = forth.heap().here();
        forth.input.fill(";").unwrap();
        forth.process_line().unwrap();
        assert_eq!(forth.output.as_str(), "; ? ok.\n");
        assert_eq!(forth.heap().here(), here);
        assert!(forth.fault().is_none());

        blocking_runtest_with(
            &mut forth,
            r#"
            > variable v 5 v ! v @ .
            < 5 ok.
            > : sq dup * ; 3 sq . ;
            < 9 ; ? ok.
            "#,
        );
    }

    #[test]
    fn nested_control_flow() {
        blocking_runtest(
            r#"
            > : classify dup 10 < if 0 < if 1 else 2 then else drop 3 then ;
            > -1 classify . 5 classify . 50 classify .
            < 1 2 3 ok.
            > : sum 0 swap begin dup 0 > if swap over + swap 1 - 0 else -1 then until drop ;
            > 4 sum .
            < 10 ok.
            "#,
        );
    }
}
