mod command_parser;
mod setting_parser;
mod statement_parser;

pub use crate::parsers::command_parser::{Command, CommandParser, LineBuffer, Pending};
pub use crate::parsers::setting_parser::SettingParser;
pub use crate::parsers::statement_parser::{SessionChange, Statement, StatementParser};

pub trait Parser {
    type Output;

    fn from_str(input: &str) -> Result<Self::Output, &'static str>;
}
