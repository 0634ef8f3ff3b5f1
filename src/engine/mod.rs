//! CLI engine: argument parsing, fixture-backed collaborators, progress and the run handler.

pub mod arg_parser;
pub mod fixtures;
pub mod handlers;
pub mod progress;

pub use arg_parser::Cli;
pub use fixtures::{FixtureCatalog, FixtureDocumentCreator, FixtureRecord, JsonLinesPublisher};
pub use handlers::handle_run;
