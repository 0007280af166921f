//! The fixed set of computations the engine understands.
//!
//! Each mode maps to one engine command-line token; the engine replies with
//! a math expression on stdout. Adding a mode means adding a variant here,
//! its token, and its button caption; the dispatch and display layers are
//! mode-agnostic.

/// A computation the external engine can run.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Mode {
    /// Partial derivative.
    PartialDerivative,
    /// Indefinite integral.
    IndefiniteIntegral,
    /// Double integral.
    DoubleIntegral,
}

impl Mode {
    /// All modes in button-bar order.
    pub const ALL: [Mode; 3] = [
        Mode::PartialDerivative,
        Mode::IndefiniteIntegral,
        Mode::DoubleIntegral,
    ];

    /// The command-line token passed to the engine.
    pub fn token(self) -> &'static str {
        match self {
            Mode::PartialDerivative => "pd",
            Mode::IndefiniteIntegral => "int",
            Mode::DoubleIntegral => "dint",
        }
    }

    /// Human-readable name for logs and errors.
    pub fn label(self) -> &'static str {
        match self {
            Mode::PartialDerivative => "partial derivative",
            Mode::IndefiniteIntegral => "integral",
            Mode::DoubleIntegral => "double integral",
        }
    }

    /// Button caption as Typst math, typeset once at startup.
    pub fn caption_markup(self) -> &'static str {
        match self {
            Mode::PartialDerivative => "(partial f)/(partial x)",
            Mode::IndefiniteIntegral => "integral f dif x",
            Mode::DoubleIntegral => "integral.double f dif x dif y",
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn tokens_are_distinct_and_non_empty() {
        let tokens: HashSet<&str> = Mode::ALL.iter().map(|m| m.token()).collect();
        assert_eq!(tokens.len(), Mode::ALL.len());
        assert!(tokens.iter().all(|t| !t.is_empty()));
    }

    #[test]
    fn tokens_match_engine_protocol() {
        assert_eq!(Mode::PartialDerivative.token(), "pd");
        assert_eq!(Mode::IndefiniteIntegral.token(), "int");
        assert_eq!(Mode::DoubleIntegral.token(), "dint");
    }

    #[test]
    fn captions_are_valid_markup_inputs() {
        for mode in Mode::ALL {
            assert!(!mode.caption_markup().trim().is_empty());
        }
    }
}
