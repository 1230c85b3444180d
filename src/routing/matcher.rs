//! Path template matching.
//!
//! # Responsibilities
//! - Compile `{param}` templates into literal and capture segments
//! - Match request paths and return captured parameters
//! - Enforce a character class on every capture
//!
//! # Design Decisions
//! - Path matching is case-sensitive
//! - A trailing slash is optional on both template and path
//! - No regex to guarantee O(n) matching

use std::fmt;

/// Characters a capture may contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamClass {
    /// `[A-Za-z0-9_-]+`
    Name,
    /// `[A-Za-z0-9_.-]+`, wide enough for IPv4 addresses and hostnames.
    Host,
}

impl ParamClass {
    /// Class used for a capture, chosen by its parameter name.
    pub fn for_param(name: &str) -> Self {
        match name {
            "host" | "address" => ParamClass::Host,
            _ => ParamClass::Name,
        }
    }

    fn accepts(self, c: char) -> bool {
        match self {
            ParamClass::Name => c.is_ascii_alphanumeric() || c == '_' || c == '-',
            ParamClass::Host => c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.',
        }
    }

    pub fn matches(self, value: &str) -> bool {
        !value.is_empty() && value.chars().all(|c| self.accepts(c))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Capture { name: String, class: ParamClass },
}

/// Template compilation failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PatternError {
    #[error("route template '{0}' must start with '/'")]
    MissingLeadingSlash(String),
    #[error("route template '{template}' has a malformed capture in segment '{segment}'")]
    MalformedCapture { template: String, segment: String },
    #[error("route template '{template}' captures '{name}' twice")]
    DuplicateCapture { template: String, name: String },
}

/// Parameters captured from a matched path, in template order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathParams(Vec<(String, String)>);

impl PathParams {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A compiled path template such as `/api/v0/cluster/{name}/hosts/{host}/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPattern {
    template: String,
    segments: Vec<Segment>,
}

impl PathPattern {
    pub fn parse(template: &str) -> Result<Self, PatternError> {
        let Some(rest) = template.strip_prefix('/') else {
            return Err(PatternError::MissingLeadingSlash(template.to_string()));
        };

        let mut segments = Vec::new();
        for raw in split_segments(rest) {
            let segment = match raw.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
                Some(name) if !name.is_empty() && ParamClass::Name.matches(name) => {
                    if segments
                        .iter()
                        .any(|s| matches!(s, Segment::Capture { name: n, .. } if n == name))
                    {
                        return Err(PatternError::DuplicateCapture {
                            template: template.to_string(),
                            name: name.to_string(),
                        });
                    }
                    Segment::Capture {
                        name: name.to_string(),
                        class: ParamClass::for_param(name),
                    }
                }
                Some(_) => {
                    return Err(PatternError::MalformedCapture {
                        template: template.to_string(),
                        segment: raw.to_string(),
                    })
                }
                None if raw.contains('{') || raw.contains('}') => {
                    return Err(PatternError::MalformedCapture {
                        template: template.to_string(),
                        segment: raw.to_string(),
                    })
                }
                None => Segment::Literal(raw.to_string()),
            };
            segments.push(segment);
        }

        Ok(Self {
            template: template.to_string(),
            segments,
        })
    }

    /// The template this pattern was compiled from.
    pub fn template(&self) -> &str {
        &self.template
    }

    /// Match a request path, returning the captures on success.
    pub fn matches(&self, path: &str) -> Option<PathParams> {
        let rest = path.strip_prefix('/')?;
        let parts: Vec<&str> = split_segments(rest).collect();
        if parts.len() != self.segments.len() {
            return None;
        }

        let mut params = Vec::new();
        for (segment, part) in self.segments.iter().zip(parts) {
            match segment {
                Segment::Literal(literal) if literal == part => {}
                Segment::Literal(_) => return None,
                Segment::Capture { name, class } if class.matches(part) => {
                    params.push((name.clone(), part.to_string()));
                }
                Segment::Capture { .. } => return None,
            }
        }
        Some(PathParams(params))
    }
}

impl fmt::Display for PathPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.template)
    }
}

/// Split a path (without its leading slash) into segments, ignoring one
/// trailing slash.
fn split_segments(rest: &str) -> impl Iterator<Item = &str> {
    let rest = rest.strip_suffix('/').unwrap_or(rest);
    rest.split('/').filter(move |_| !rest.is_empty())
}
