use std::fmt;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

#[derive(Deserialize, Serialize, Debug, Clone, Copy, Hash, ValueEnum, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Category {
    #[default]
    Normal,
    #[serde(alias = "PERIGO")]
    Danger,
    #[serde(alias = "EVENTO")]
    Event,
}

impl Category {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Normal => "NORMAL",
            Self::Danger => "DANGER",
            Self::Event => "EVENT",
        }
    }

    /// Unknown names fall back to `Normal`.
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_uppercase().as_str() {
            "DANGER" | "PERIGO" => Self::Danger,
            "EVENT" | "EVENTO" => Self::Event,
            _ => Self::Normal,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip() {
        for category in [Category::Normal, Category::Danger, Category::Event] {
            assert_eq!(Category::from_name(category.name()), category);
        }
    }

    #[test]
    fn legacy_and_unknown_names() {
        assert_eq!(Category::from_name("evento"), Category::Event);
        assert_eq!(Category::from_name("PERIGO"), Category::Danger);
        assert_eq!(Category::from_name("party"), Category::Normal);
        assert_eq!(Category::from_name(""), Category::Normal);
    }
}
