use crate::builtin::default_builtins;
use crate::command::{CommandFactory, ExecutableCommand};
use crate::config::Limits;
use crate::editor::LineEditor;
use crate::executor::Executor;
use crate::history::History;
use crate::parser::{self, Pipeline};
use crate::state::ShellState;
use anyhow::Context;
use log::{debug, info};
use nix::sys::signal::{SaFlags, SigAction, SigHandler, SigSet, Signal, sigaction};
use std::fs::OpenOptions;
use std::io::{Read, Stdin, Stdout, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::path::PathBuf;

const SHELL_NAME: &str = env!("CARGO_PKG_NAME");

/// The read-eval loop: edit a line, remember it, parse it, run it.
///
/// Example
/// ```
/// use pipesh::{LineEditor, Limits, Shell};
/// use std::io::Cursor;
///
/// let editor = LineEditor::new(Cursor::new(b"history\n".to_vec()), Vec::new(), "$ ", 1024);
/// let mut sh = Shell::new(editor, Limits::default());
/// sh.run().unwrap();
/// assert_eq!(sh.state().history.len(), 1);
/// ```
pub struct Shell<R, W> {
    editor: LineEditor<R, W>,
    state: ShellState,
    executor: Executor,
    builtins: Vec<Box<dyn CommandFactory>>,
    limits: Limits,
}

impl Shell<Stdin, Stdout> {
    /// Shell on the process' terminal.
    pub fn interactive(prompt: impl Into<String>, limits: Limits) -> Self {
        Self::new(LineEditor::stdio(prompt, limits.max_line_len), limits)
    }
}

impl<R: Read, W: Write> Shell<R, W> {
    pub fn new(editor: LineEditor<R, W>, limits: Limits) -> Self {
        Self {
            editor,
            state: ShellState::new(History::new(limits.history_size)),
            executor: Executor::new(SHELL_NAME),
            builtins: default_builtins(),
            limits,
        }
    }

    pub fn state(&self) -> &ShellState {
        &self.state
    }

    /// The display shared by the editor and the built-ins.
    pub fn display(&mut self) -> &mut W {
        self.editor.output()
    }

    /// Loop until `exit` or end of input.
    pub fn run(&mut self) -> anyhow::Result<()> {
        while !self.state.should_exit {
            let Some(line) = self
                .editor
                .read_line(&mut self.state.history)
                .context("failed to read command line")?
            else {
                info!("end of input");
                break;
            };
            self.state.history.record(&line);
            self.eval(&line)?;
        }
        Ok(())
    }

    /// Run one submitted line.
    ///
    /// Problems with the line itself are reported on stderr and swallowed; only a
    /// failure to write to the display is returned.
    pub fn eval(&mut self, line: &str) -> anyhow::Result<()> {
        let pipeline = match parser::parse(line, &self.limits) {
            Ok(pipeline) => pipeline,
            Err(e) => {
                eprintln!("{}: {}", SHELL_NAME, e);
                return Ok(());
            }
        };
        if pipeline.is_empty() {
            return Ok(());
        }

        if let Some((cmd, output)) = self.builtin_for(&pipeline) {
            return self.run_builtin(cmd, output);
        }

        match self.executor.execute(&pipeline) {
            Ok(status) => debug!("{:?} finished with {:?}", line, status.codes),
            Err(e) => eprintln!("{}: {}", SHELL_NAME, e),
        }
        Ok(())
    }

    /// A built-in is only recognized when it is the sole runnable stage.
    fn builtin_for(
        &self,
        pipeline: &Pipeline,
    ) -> Option<(Box<dyn ExecutableCommand>, Option<PathBuf>)> {
        let mut runnable = pipeline.runnable();
        let stage = runnable.next()?;
        if runnable.next().is_some() {
            return None;
        }
        let name = stage.program()?;
        let args: Vec<&str> = stage.argv[1..].iter().map(String::as_str).collect();
        self.builtins
            .iter()
            .find_map(|factory| factory.try_create(name, &args))
            .map(|cmd| (cmd, stage.output.clone()))
    }

    fn run_builtin(
        &mut self,
        cmd: Box<dyn ExecutableCommand>,
        output: Option<PathBuf>,
    ) -> anyhow::Result<()> {
        let result = match output {
            Some(path) => {
                let file = OpenOptions::new()
                    .write(true)
                    .create(true)
                    .truncate(true)
                    .mode(0o644)
                    .open(&path);
                match file {
                    Ok(mut file) => cmd.execute(&mut file, &mut self.state),
                    Err(e) => {
                        eprintln!(
                            "{}: cannot open `{}` for writing: {}",
                            SHELL_NAME,
                            path.display(),
                            e
                        );
                        return Ok(());
                    }
                }
            }
            None => {
                let result = cmd.execute(self.editor.output(), &mut self.state);
                self.editor.output().flush()?;
                result
            }
        };
        match result {
            Ok(code) => debug!("builtin finished with {}", code),
            Err(e) => eprintln!("{}: {:#}", SHELL_NAME, e),
        }
        Ok(())
    }
}

extern "C" fn note_interrupt(_: nix::libc::c_int) {}

/// Keep the shell alive on SIGINT.
///
/// A caught signal is reset to its default disposition by `exec`, so children
/// still die on Ctrl-C while the shell only sees its current wait or read
/// interrupted.
pub fn install_interrupt_handler() -> nix::Result<()> {
    let action = SigAction::new(
        SigHandler::Handler(note_interrupt),
        SaFlags::empty(),
        SigSet::empty(),
    );
    // SAFETY: the handler has an empty body.
    unsafe { sigaction(Signal::SIGINT, &action) }.map(drop)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env as stdenv;
    use std::fs;
    use std::io::Cursor;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn shell(keys: &[u8]) -> Shell<Cursor<Vec<u8>>, Vec<u8>> {
        let editor = LineEditor::new(Cursor::new(keys.to_vec()), Vec::new(), "$ ", 1024);
        Shell::new(editor, Limits::default())
    }

    fn display(sh: &mut Shell<Cursor<Vec<u8>>, Vec<u8>>) -> String {
        String::from_utf8(sh.display().clone()).unwrap()
    }

    fn listed(sh: &Shell<Cursor<Vec<u8>>, Vec<u8>>) -> Vec<String> {
        sh.state()
            .history
            .list()
            .map(|(_, line)| line.to_string())
            .collect()
    }

    fn unique_temp_path(tag: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        stdenv::temp_dir().join(format!("pipesh_shell_{}_{}_{}", tag, std::process::id(), nanos))
    }

    #[test]
    fn test_exit_stops_the_loop() {
        let mut sh = shell(b"exit\nhistory\n");
        sh.run().unwrap();

        assert!(sh.state().should_exit);
        assert_eq!(listed(&sh), vec!["exit"]);
        assert!(display(&mut sh).ends_with("Leaving...\n"));
    }

    #[test]
    fn test_empty_line_is_neither_recorded_nor_run() {
        let mut sh = shell(b"\n   \nhistory\n");
        sh.run().unwrap();

        assert_eq!(listed(&sh), vec!["   ", "history"]);
        assert!(display(&mut sh).contains("1:    \n2: history\n"));
    }

    #[test]
    fn test_interrupted_line_is_not_recorded() {
        let mut sh = shell(b"sleep 100\x03history\n");
        sh.run().unwrap();

        assert_eq!(listed(&sh), vec!["history"]);
    }

    #[test]
    fn test_parse_error_does_not_end_the_loop() {
        let mut sh = shell(b"ls >\nhistory\n");
        sh.run().unwrap();

        assert!(display(&mut sh).contains("1: ls >\n2: history\n"));
    }

    #[test]
    #[serial]
    fn test_missing_program_does_not_end_the_loop() {
        let mut sh = shell(b"pipesh-no-such-program-xyz\nhistory\n");
        sh.run().unwrap();

        assert!(display(&mut sh).contains("2: history\n"));
    }

    #[test]
    #[serial]
    fn test_recalled_line_is_recorded_again() {
        let mut sh = shell(b"true\n\x1b[A\n");
        sh.run().unwrap();

        assert_eq!(listed(&sh), vec!["true", "true"]);
    }

    #[test]
    #[serial]
    fn test_pipeline_output_redirect() -> anyhow::Result<()> {
        let path = unique_temp_path("pipe");
        let keys = format!("printf b\\na\\n | sort > {}\n", path.display());
        let mut sh = shell(keys.as_bytes());
        sh.run()?;

        assert_eq!(fs::read_to_string(&path)?, "a\nb\n");
        fs::remove_file(path)?;
        Ok(())
    }

    #[test]
    fn test_builtin_output_redirect() -> anyhow::Result<()> {
        let path = unique_temp_path("hist");
        let keys = format!("echo a\x03history > {}\n", path.display());
        let mut sh = shell(keys.as_bytes());
        sh.run()?;

        let expected = format!("1: history > {}\n", path.display());
        assert_eq!(fs::read_to_string(&path)?, expected);
        fs::remove_file(path)?;
        Ok(())
    }

    #[test]
    fn test_builtin_in_pipeline_is_not_run_in_process() {
        let sh = shell(b"");
        let pipeline = parser::parse("history | cat", &Limits::default()).unwrap();
        assert!(sh.builtin_for(&pipeline).is_none());

        let pipeline = parser::parse("| history |", &Limits::default()).unwrap();
        assert!(sh.builtin_for(&pipeline).is_some());
    }
}
