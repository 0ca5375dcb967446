/*!
Text codec for settings documents.

The format is JSON restricted to the value model (no floats, no null) and extended
with `//` and `/* */` comments between tokens. Integers have arbitrary precision.
*/

pub mod reader;
pub mod writer;

pub use reader::{parse, MAX_DEPTH, MAX_INTEGER_DIGITS};
pub use writer::{write, Style, Writer};
