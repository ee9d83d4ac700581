#![doc = include_str!("../README.md")]

pub mod constants;
mod decode;
mod encode;
mod error;
mod input;
pub mod json;
pub mod pretty;
mod strings;


pub use decode::{Cursor, Kind, ParseOptions, Parser};
pub use encode::{Container, Encoder};
pub use error::{Error, Result};
pub use input::{Input, SliceInput, WindowInput};
pub use json::{write_json, JsonOptions};
pub use pretty::{write_pretty, PrettyOptions};
pub use strings::StringIter;
