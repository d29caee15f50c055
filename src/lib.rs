//! A small interactive shell: raw-mode line editing with history recall, and
//! pipelines of external programs with file redirection.
//!
//! The pieces are usable on their own:
//! - [`History`] remembers submitted lines and drives arrow-key recall.
//! - [`LineEditor`] turns a keystroke stream into a completed line.
//! - [`parser::parse`] splits a line into a [`Pipeline`] of [`Stage`]s.
//! - [`Executor`] forks one child per stage, wires the pipes and reaps them all.
//!
//! [`Shell`] ties them together into the read-eval loop the binary runs.

mod builtin;
pub mod command;
pub mod config;
pub mod editor;
pub mod executor;
pub mod history;
mod lexer;
pub mod parser;
pub mod shell;
pub mod state;
mod terminal;

pub use config::Limits;
pub use editor::LineEditor;
pub use executor::{ExecError, Executor, PipelineStatus, RedirectPlan, Streams};
pub use history::{History, Recall};
pub use parser::{ParseError, Pipeline, Stage};
pub use shell::Shell;
