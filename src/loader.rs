use std::fs;
use std::path::PathBuf;

use thiserror::Error;
use tracing::debug;

use crate::config;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("cannot read `{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Bad word count in {name}: {count}")]
    BadWordCount { name: String, count: String },
    #[error("File {name} advertised {expected} words but had only {found}")]
    Truncated { name: String, expected: usize, found: usize },
    #[error("Bad data for word {index} in file {name}")]
    BadWord { name: String, index: usize },
    #[error("Program {name} has {words} words but memory holds only {capacity}")]
    TooLarge { name: String, words: usize, capacity: usize },
}

/// Decoded program: the words that land at address 0 onwards.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgramImage {
    words: Vec<i32>,
}

impl ProgramImage {
    pub fn new(name: &str, words: Vec<i32>) -> Result<Self, LoadError> {
        if words.len() > config::MEMORY_SIZE {
            return Err(LoadError::TooLarge {
                name: name.to_string(),
                words: words.len(),
                capacity: config::MEMORY_SIZE,
            });
        }
        Ok(Self { words })
    }

    pub fn words(&self) -> &[i32] {
        &self.words
    }
}

/// Something that can produce a program image, again and again for `restart`.
pub trait ProgramSource {
    fn name(&self) -> &str;
    fn load(&self) -> Result<ProgramImage, LoadError>;
}

pub struct FileSource {
    path: PathBuf,
    name: String,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path.display().to_string();
        Self { path, name }
    }
}

impl ProgramSource for FileSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn load(&self) -> Result<ProgramImage, LoadError> {
        let text = fs::read_to_string(&self.path).map_err(|source| LoadError::Io {
            path: self.name.clone(),
            source,
        })?;
        parse_image(&self.name, &text)
    }
}

/// Program text held in memory.
#[cfg(test)]
pub struct TextSource {
    name: String,
    text: String,
}

#[cfg(test)]
impl TextSource {
    pub fn new(name: &str, text: &str) -> Self {
        Self { name: name.to_string(), text: text.to_string() }
    }
}

#[cfg(test)]
impl ProgramSource for TextSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn load(&self) -> Result<ProgramImage, LoadError> {
        parse_image(&self.name, &self.text)
    }
}

/// Parses `N w0 w1 ... wN-1`. Anything after the advertised words is ignored.
pub fn parse_image(name: &str, text: &str) -> Result<ProgramImage, LoadError> {
    let mut tokens = text.split_whitespace();

    let count_token = tokens.next().unwrap_or("");
    let expected = match count_token.parse::<i64>() {
        Ok(count) if count >= 0 => count as usize,
        _ => {
            return Err(LoadError::BadWordCount {
                name: name.to_string(),
                count: count_token.to_string(),
            });
        }
    };

    if expected > config::MEMORY_SIZE {
        return Err(LoadError::TooLarge {
            name: name.to_string(),
            words: expected,
            capacity: config::MEMORY_SIZE,
        });
    }

    let mut words = Vec::with_capacity(expected);
    for index in 0..expected {
        let Some(token) = tokens.next() else {
            return Err(LoadError::Truncated {
                name: name.to_string(),
                expected,
                found: index,
            });
        };
        let word = token.parse::<i32>().map_err(|_| LoadError::BadWord {
            name: name.to_string(),
            index,
        })?;
        words.push(word);
    }

    debug!(name, words = words.len(), "loaded program image");
    ProgramImage::new(name, words)
}
