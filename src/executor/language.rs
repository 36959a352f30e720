//! Supported source languages and request tag normalization.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Languages the executor can compile and run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    /// Python, run directly by the interpreter
    Python,
    /// C, compiled with gcc
    C,
    /// C++, compiled with g++
    Cpp,
    /// Java, compiled with javac and run on the JVM
    Java,
    /// C#, built and run as a dotnet project
    CSharp,
}

/// A language tag that does not map to any supported language
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Language {0} not supported")]
pub struct UnknownLanguage(pub String);

impl Language {
    /// Get all supported languages
    #[must_use]
    pub const fn all() -> [Self; 5] {
        [Self::Python, Self::C, Self::Cpp, Self::Java, Self::CSharp]
    }

    /// Get the canonical tag
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Python => "python",
            Self::C => "c",
            Self::Cpp => "cpp",
            Self::Java => "java",
            Self::CSharp => "csharp",
        }
    }

    /// Get the display name
    #[must_use]
    pub const fn display_name(&self) -> &'static str {
        match self {
            Self::Python => "Python",
            Self::C => "C",
            Self::Cpp => "C++",
            Self::Java => "Java",
            Self::CSharp => "C#",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Language {
    type Err = UnknownLanguage;

    /// Case-insensitive; accepts `c++` for C++ and `c#` for C#.
    fn from_str(tag: &str) -> Result<Self, Self::Err> {
        match tag.trim().to_ascii_lowercase().as_str() {
            "python" => Ok(Self::Python),
            "c" => Ok(Self::C),
            "cpp" | "c++" => Ok(Self::Cpp),
            "java" => Ok(Self::Java),
            "csharp" | "c#" => Ok(Self::CSharp),
            _ => Err(UnknownLanguage(tag.trim().to_string())),
        }
    }
}
