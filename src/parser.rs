use crate::config::Limits;
use crate::lexer::{self, Token};
use log::debug;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Kind of redirection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectKind {
    /// Input redirection (`<`): reads standard input from a file.
    Input,
    /// Output redirection (`>`): writes standard output to a file, truncating it.
    Output,
}

impl fmt::Display for RedirectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RedirectKind::Input => f.write_str("<"),
            RedirectKind::Output => f.write_str(">"),
        }
    }
}

/// Errors that reject a whole line before anything is executed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// A redirection operator is not followed by a path. An operator in the
    /// path position (`cmd > < x`) counts as missing.
    #[error("syntax error: `{kind}` in stage {stage} has no target path")]
    MissingRedirectTarget { stage: usize, kind: RedirectKind },
    /// The same stream is redirected twice in one stage.
    #[error("syntax error: stage {stage} redirects `{kind}` more than once")]
    DuplicateRedirect { stage: usize, kind: RedirectKind },
}

/// One program invocation between pipe operators.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Stage {
    /// Program name followed by its arguments. Redirections are not included.
    pub argv: Vec<String>,
    /// Path given after `<`.
    pub input: Option<PathBuf>,
    /// Path given after `>`.
    pub output: Option<PathBuf>,
}

impl Stage {
    /// Program name, `argv[0]`.
    pub fn program(&self) -> Option<&str> {
        self.argv.first().map(String::as_str)
    }

    /// A stage without a program name (e.g. between `||`) is skipped at execution.
    pub fn is_noop(&self) -> bool {
        self.argv.is_empty()
    }
}

/// Ordered stages whose standard streams are chained by pipes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Pipeline {
    pub stages: Vec<Stage>,
}

impl Pipeline {
    /// Stages that have a program to run, in pipeline order.
    pub fn runnable(&self) -> impl Iterator<Item = &Stage> {
        self.stages.iter().filter(|stage| !stage.is_noop())
    }

    /// True when nothing would be spawned, e.g. for an empty line.
    pub fn is_empty(&self) -> bool {
        self.runnable().next().is_none()
    }
}

/// Parse a completed line into a pipeline.
///
/// The line is split on `|` into at most `limits.max_stages` segments, each
/// segment is tokenized on spaces (at most `limits.max_args` tokens) and the
/// `<`/`>` operators are pulled out together with the path that follows them.
pub fn parse(line: &str, limits: &Limits) -> Result<Pipeline, ParseError> {
    let stages = line
        .split('|')
        .take(limits.max_stages)
        .enumerate()
        .map(|(index, segment)| {
            parse_stage(lexer::split_into_tokens(segment, limits.max_args), index + 1)
        })
        .collect::<Result<Vec<_>, _>>()?;
    let pipeline = Pipeline { stages };
    debug!("parsed {:?} into {:?}", line, pipeline);
    Ok(pipeline)
}

fn parse_stage(tokens: Vec<Token>, stage: usize) -> Result<Stage, ParseError> {
    let mut result = Stage::default();
    let mut tokens = tokens.into_iter();

    while let Some(token) = tokens.next() {
        let kind = match token {
            Token::Word(word) => {
                result.argv.push(word);
                continue;
            }
            Token::RedirectLeft => RedirectKind::Input,
            Token::RedirectRight => RedirectKind::Output,
        };

        let target = match tokens.next() {
            Some(Token::Word(path)) => PathBuf::from(path),
            _ => return Err(ParseError::MissingRedirectTarget { stage, kind }),
        };
        let slot = match kind {
            RedirectKind::Input => &mut result.input,
            RedirectKind::Output => &mut result.output,
        };
        if slot.is_some() {
            return Err(ParseError::DuplicateRedirect { stage, kind });
        }
        *slot = Some(target);
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(words: &[&str]) -> Vec<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    fn parse_default(line: &str) -> Result<Pipeline, ParseError> {
        parse(line, &Limits::default())
    }

    #[test]
    fn test_output_redirect_is_removed_from_argv() {
        let pipeline = parse_default("echo hello > out.txt").unwrap();

        assert_eq!(pipeline.stages.len(), 1);
        let stage = &pipeline.stages[0];
        assert_eq!(stage.argv, args(&["echo", "hello"]));
        assert_eq!(stage.output, Some(PathBuf::from("out.txt")));
        assert_eq!(stage.input, None);
    }

    #[test]
    fn test_three_stage_pipeline_with_input_redirect() {
        let pipeline = parse_default("grep foo < in.txt | sort | uniq -c").unwrap();

        assert_eq!(
            pipeline.stages,
            vec![
                Stage {
                    argv: args(&["grep", "foo"]),
                    input: Some(PathBuf::from("in.txt")),
                    output: None,
                },
                Stage {
                    argv: args(&["sort"]),
                    input: None,
                    output: None,
                },
                Stage {
                    argv: args(&["uniq", "-c"]),
                    input: None,
                    output: None,
                },
            ]
        );
    }

    #[test]
    fn test_redirect_before_program_name() {
        let pipeline = parse_default("< in.txt wc -l").unwrap();
        let stage = &pipeline.stages[0];

        assert_eq!(stage.program(), Some("wc"));
        assert_eq!(stage.argv, args(&["wc", "-l"]));
        assert_eq!(stage.input, Some(PathBuf::from("in.txt")));
    }

    #[test]
    fn test_dangling_redirect_is_an_error() {
        assert_eq!(
            parse_default("ls >"),
            Err(ParseError::MissingRedirectTarget {
                stage: 1,
                kind: RedirectKind::Output
            })
        );
    }

    #[test]
    fn test_redirect_before_pipe_boundary_is_an_error() {
        assert_eq!(
            parse_default("cmd > | sort"),
            Err(ParseError::MissingRedirectTarget {
                stage: 1,
                kind: RedirectKind::Output
            })
        );
    }

    #[test]
    fn test_operator_as_redirect_target_is_an_error() {
        assert_eq!(
            parse_default("sort < > out"),
            Err(ParseError::MissingRedirectTarget {
                stage: 1,
                kind: RedirectKind::Input
            })
        );
    }

    #[test]
    fn test_duplicate_redirect_is_an_error() {
        let err = parse_default("ls | cat > a > b").unwrap_err();
        assert_eq!(
            err,
            ParseError::DuplicateRedirect {
                stage: 2,
                kind: RedirectKind::Output
            }
        );
        assert_eq!(
            err.to_string(),
            "syntax error: stage 2 redirects `>` more than once"
        );
    }

    #[test]
    fn test_empty_segment_is_noop_stage() {
        let pipeline = parse_default("ls || wc").unwrap();

        assert_eq!(pipeline.stages.len(), 3);
        assert!(pipeline.stages[1].is_noop());
        let programs: Vec<_> = pipeline.runnable().filter_map(Stage::program).collect();
        assert_eq!(programs, vec!["ls", "wc"]);
    }

    #[test]
    fn test_empty_line_spawns_nothing() {
        assert!(parse_default("").unwrap().is_empty());
        assert!(parse_default("   ").unwrap().is_empty());
        assert!(parse_default(" | ").unwrap().is_empty());
    }

    #[test]
    fn test_stage_limit_truncates_silently() {
        let limits = Limits {
            max_stages: 2,
            ..Limits::default()
        };
        let pipeline = parse("a | b | c | d", &limits).unwrap();

        let programs: Vec<_> = pipeline.runnable().filter_map(Stage::program).collect();
        assert_eq!(programs, vec!["a", "b"]);
    }

    #[test]
    fn test_argument_limit_truncates_silently() {
        let limits = Limits {
            max_args: 2,
            ..Limits::default()
        };
        let pipeline = parse("echo a b c", &limits).unwrap();
        assert_eq!(pipeline.stages[0].argv, args(&["echo", "a"]));
    }

    #[test]
    fn test_redirect_only_stage_has_no_program() {
        let pipeline = parse_default("> out.txt").unwrap();
        assert!(pipeline.stages[0].is_noop());
        assert!(pipeline.is_empty());
    }
}
