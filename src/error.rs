// Copyright 2021 Peter Williams <pwil3058@gmail.com> <pwil3058@bigpond.net.au>

use std::fmt;

#[derive(Debug, Default, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Location {
    /// Label for the source of the text (usually a file path).
    pub label: String,
    pub line_number: usize,
    pub offset: usize,
}

impl Location {
    pub fn new(label: &str, line_number: usize, offset: usize) -> Self {
        Self {
            label: label.to_string(),
            line_number,
            offset,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.label.len() > 0 {
            write!(f, "{}:{}:{}", self.label, self.line_number, self.offset)
        } else {
            write!(f, "{}:{}", self.line_number, self.offset)
        }
    }
}

#[derive(Debug, Clone)]
pub enum BuildError {
    UndefinedSymbol {
        name: String,
        used_at: Location,
    },
    NonTermTransitionNotSingleShift {
        state: i64,
        symbol: String,
    },
    CommitOnNonTermTransition {
        state: i64,
        symbol: String,
    },
    ParseStopIncompatible {
        parser: String,
    },
    InternalOrderingGap {
        state: i64,
    },
}

impl fmt::Display for BuildError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            BuildError::UndefinedSymbol { name, used_at } => {
                write!(f, "{}: \"{}\" was not defined as anything", used_at, name)
            }
            BuildError::NonTermTransitionNotSingleShift { state, symbol } => {
                write!(
                    f,
                    "state {}: transition on non terminal \"{}\" is something other than a single shift",
                    state, symbol
                )
            }
            BuildError::CommitOnNonTermTransition { state, symbol } => {
                write!(
                    f,
                    "state {}: transition on non terminal \"{}\" has a commit",
                    state, symbol
                )
            }
            BuildError::ParseStopIncompatible { parser } => {
                write!(f, "grammar for \"{}\" is not usable with parse stop", parser)
            }
            BuildError::InternalOrderingGap { state } => {
                write!(
                    f,
                    "state {}: action ordering did not cover the state's dot items",
                    state
                )
            }
        }
    }
}

/// Errors accumulated before the build gave up. A pass runs to completion so
/// that sibling problems are reported together; the next pass is never
/// entered with errors outstanding.
#[derive(Debug, Default)]
pub struct BuildErrors(pub Vec<BuildError>);

impl BuildErrors {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &BuildError> {
        self.0.iter()
    }
}

impl fmt::Display for BuildErrors {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for error in self.0.iter() {
            writeln!(f, "Error: {}.", error)?;
        }
        write!(f, "{} errors", self.0.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_location() {
        let location = Location::new("whatever", 10, 15);
        assert_eq!(format!("{}", location), "whatever:10:15");
        let location = Location::new("", 9, 23);
        assert_eq!(format!("{}", location), "9:23");
    }

    #[test]
    fn format_build_errors() {
        let mut errors = BuildErrors::default();
        errors.0.push(BuildError::UndefinedSymbol {
            name: "thing".to_string(),
            used_at: Location::new("grammar", 3, 7),
        });
        errors.0.push(BuildError::ParseStopIncompatible {
            parser: "item".to_string(),
        });
        let text = format!("{}", errors);
        assert!(text.contains("\"thing\" was not defined"));
        assert!(text.contains("2 errors"));
    }
}
