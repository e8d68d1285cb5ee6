//! Language tags and the execution strategy each one maps to.

use std::fmt;
use std::str::FromStr;

use crate::config::KernelConfig;

/// A language the client may tag code with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Language {
    CraftLang,
    JavaScript,
    Python,
    Cpp,
    C,
}

/// How a language is run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Strategy {
    /// In-process lexer, parser and interpreter.
    Embedded,
    /// `program <source>`.
    Interpreted { program: String },
    /// `compiler -o <binary> <source>`, then `<binary>`.
    Compiled { compiler: String },
}

impl Language {
    /// Extension of the scratch source file.
    pub fn extension(self) -> &'static str {
        match self {
            Language::CraftLang => ".craft",
            Language::JavaScript => ".js",
            Language::Python => ".py",
            Language::Cpp => ".cpp",
            Language::C => ".c",
        }
    }

    pub fn strategy(self, config: &KernelConfig) -> Strategy {
        match self {
            Language::CraftLang => Strategy::Embedded,
            Language::JavaScript => Strategy::Interpreted {
                program: config.node.clone(),
            },
            Language::Python => Strategy::Interpreted {
                program: config.python.clone(),
            },
            Language::Cpp => Strategy::Compiled {
                compiler: config.cxx.clone(),
            },
            Language::C => Strategy::Compiled {
                compiler: config.cc.clone(),
            },
        }
    }
}

/// Error for a tag no strategy handles.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unsupported language: {0}")]
pub struct UnsupportedLanguage(pub String);

impl FromStr for Language {
    type Err = UnsupportedLanguage;

    fn from_str(tag: &str) -> Result<Self, Self::Err> {
        match tag.to_ascii_lowercase().as_str() {
            "craftlang" | "craft" => Ok(Language::CraftLang),
            "javascript" | "js" | "node" => Ok(Language::JavaScript),
            "python" | "py" | "python3" => Ok(Language::Python),
            "cpp" | "c++" => Ok(Language::Cpp),
            "c" => Ok(Language::C),
            _ => Err(UnsupportedLanguage(tag.to_string())),
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            Language::CraftLang => "craftlang",
            Language::JavaScript => "javascript",
            Language::Python => "python",
            Language::Cpp => "cpp",
            Language::C => "c",
        };
        f.write_str(tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("craftlang", Language::CraftLang, ".craft")]
    #[case("javascript", Language::JavaScript, ".js")]
    #[case("Python", Language::Python, ".py")]
    #[case("cpp", Language::Cpp, ".cpp")]
    #[case("c", Language::C, ".c")]
    fn tags_parse(#[case] tag: &str, #[case] language: Language, #[case] ext: &str) {
        let parsed: Language = tag.parse().expect("known tag");
        assert_eq!(parsed, language);
        assert_eq!(parsed.extension(), ext);
    }

    #[test]
    fn unknown_tag_names_itself() {
        let err = "java".parse::<Language>().unwrap_err();
        assert_eq!(err.to_string(), "Unsupported language: java");
    }

    #[test]
    fn strategies_follow_config() {
        let config = KernelConfig::default();
        assert_eq!(Language::CraftLang.strategy(&config), Strategy::Embedded);
        assert_eq!(
            Language::Cpp.strategy(&config),
            Strategy::Compiled {
                compiler: "g++".into()
            }
        );
        assert_eq!(
            Language::Python.strategy(&config),
            Strategy::Interpreted {
                program: "python3".into()
            }
        );
    }
}
