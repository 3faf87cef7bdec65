//! Typed filter graph builder.
//!
//! Filters are assembled as values and serialized to ffmpeg's
//! `-filter_complex` syntax in one place. Argument values go through both
//! escaping levels ffmpeg applies (option value, then graph description),
//! so user text and file paths never need manual quoting.

use std::fmt::{self, Display};

/// Escape an option value (first level): `\`, `'` and `:`.
pub fn escape_option_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\\' | '\'' | ':') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Escape a string for embedding in a graph description (second level):
/// `\`, `'`, `[`, `]`, `,` and `;`.
pub fn escape_graph_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\\' | '\'' | '[' | ']' | ',' | ';') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Both escaping levels, in the order ffmpeg undoes them.
pub fn escape_filter_arg(value: &str) -> String {
    escape_graph_value(&escape_option_value(value))
}

/// Format seconds with millisecond precision.
pub fn secs(value: f64) -> String {
    format!("{:.3}", value)
}

/// A single filter with its arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    name: String,
    args: Vec<(Option<String>, String)>,
}

impl Filter {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: Vec::new(),
        }
    }

    /// Add a `key=value` argument.
    pub fn arg(mut self, key: impl Into<String>, value: impl Display) -> Self {
        self.args.push((Some(key.into()), value.to_string()));
        self
    }

    /// Add an argument only when `value` is present.
    pub fn arg_opt(self, key: impl Into<String>, value: Option<impl Display>) -> Self {
        match value {
            Some(v) => self.arg(key, v),
            None => self,
        }
    }

    /// Add a positional argument.
    pub fn positional(mut self, value: impl Display) -> Self {
        self.args.push((None, value.to_string()));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Raw (unescaped) value of a keyed argument.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.args
            .iter()
            .find(|(k, _)| k.as_deref() == Some(key))
            .map(|(_, v)| v.as_str())
    }
}

impl Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        for (i, (key, value)) in self.args.iter().enumerate() {
            f.write_str(if i == 0 { "=" } else { ":" })?;
            if let Some(key) = key {
                write!(f, "{}=", key)?;
            }
            f.write_str(&escape_filter_arg(value))?;
        }
        Ok(())
    }
}

/// A linear chain of filters between labelled pads.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FilterChain {
    inputs: Vec<String>,
    filters: Vec<Filter>,
    outputs: Vec<String>,
}

impl FilterChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Chain reading from the given pads (`0:v`, `v0`, ...).
    pub fn from_pads<I, S>(pads: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            inputs: pads.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn input(mut self, pad: impl Into<String>) -> Self {
        self.inputs.push(pad.into());
        self
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn output(mut self, pad: impl Into<String>) -> Self {
        self.outputs.push(pad.into());
        self
    }

    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }
}

impl Display for FilterChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for pad in &self.inputs {
            write!(f, "[{}]", pad)?;
        }
        for (i, filter) in self.filters.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}", filter)?;
        }
        for pad in &self.outputs {
            write!(f, "[{}]", pad)?;
        }
        Ok(())
    }
}

/// A complete filter graph made of chains separated by `;`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FilterGraph {
    chains: Vec<FilterChain>,
}

impl FilterGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn chain(mut self, chain: FilterChain) -> Self {
        self.chains.push(chain);
        self
    }

    pub fn push(&mut self, chain: FilterChain) {
        self.chains.push(chain);
    }

    pub fn chains(&self) -> &[FilterChain] {
        &self.chains
    }

    pub fn is_empty(&self) -> bool {
        self.chains.is_empty()
    }

    /// Serialize to `-filter_complex` syntax.
    pub fn render(&self) -> String {
        self.to_string()
    }
}

impl Display for FilterGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, chain) in self.chains.iter().enumerate() {
            if i > 0 {
                f.write_str(";")?;
            }
            write!(f, "{}", chain)?;
        }
        Ok(())
    }
}
