//! Template compilation with caching and retries.
//!
//! Compiled templates are cached process-wide, keyed by the exact source
//! string. Only short sources are cached — the corpus of distinct short
//! templates in a deployment is small and finite, while long one-off
//! documents would grow the cache without bound. There is no invalidation:
//! a given source string always compiles to the same tree, so entries stay
//! valid for the process lifetime.
//!
//! Compilation is retried a fixed number of times before the failure is
//! surfaced. Concurrent duplicate compiles of the same source are harmless;
//! the last writer into the cache wins.

use std::sync::Arc;

use crate::cache::KeyedCache;
use crate::core::{ConfectError, Result};

use super::parser::{self, Node};

/// Sources longer than this are compiled on every use instead of cached.
pub const CACHEABLE_SOURCE_LIMIT: usize = 512;

/// Retries after the first failed compilation attempt.
pub const COMPILE_RETRIES: usize = 3;

/// An immutable, executable template.
///
/// Carries no execution state, so one instance may be executed from any
/// number of threads concurrently.
#[derive(Debug)]
pub struct CompiledTemplate {
    source: String,
    nodes: Vec<Node>,
}

impl CompiledTemplate {
    /// The source text this template was compiled from.
    pub fn source(&self) -> &str {
        &self.source
    }

    pub(crate) fn nodes(&self) -> &[Node] {
        &self.nodes
    }
}

/// Compiles template sources, serving repeat compilations from cache.
pub struct TemplateCompiler {
    cache: KeyedCache<Arc<CompiledTemplate>>,
    #[cfg(test)]
    transient_failures: std::sync::atomic::AtomicUsize,
}

impl TemplateCompiler {
    /// Creates a compiler with an empty cache.
    pub fn new() -> Self {
        Self {
            cache: KeyedCache::new(),
            #[cfg(test)]
            transient_failures: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    /// Compiles `source`, consulting the compiled-template cache first for
    /// sources within [`CACHEABLE_SOURCE_LIMIT`].
    pub fn compile(&self, source: &str) -> Result<Arc<CompiledTemplate>> {
        let cacheable = source.len() <= CACHEABLE_SOURCE_LIMIT;
        if cacheable {
            if let Some(template) = self.cache.get(source) {
                tracing::debug!("template from cache: {source}");
                return Ok(template);
            }
        }

        let template = Arc::new(self.compile_with_retries(source)?);
        if cacheable {
            self.cache.put(source, Arc::clone(&template));
        }
        Ok(template)
    }

    /// Number of currently cached compiled templates.
    pub fn cached_templates(&self) -> usize {
        self.cache.len()
    }

    fn compile_with_retries(&self, source: &str) -> Result<CompiledTemplate> {
        let mut attempt = 0;
        loop {
            match self.try_parse(source) {
                Ok(nodes) => {
                    tracing::debug!("template compiled: {source}");
                    return Ok(CompiledTemplate { source: source.to_string(), nodes });
                }
                Err(err) if attempt < COMPILE_RETRIES => {
                    tracing::debug!("compile attempt {attempt} failed, retrying: {err}");
                    attempt += 1;
                }
                Err(err) => {
                    return Err(ConfectError::Compile {
                        source_text: source.to_string(),
                        cause: err.to_string(),
                    });
                }
            }
        }
    }

    fn try_parse(&self, source: &str) -> std::result::Result<Vec<Node>, parser::ParseError> {
        #[cfg(test)]
        {
            use std::sync::atomic::Ordering;
            if self.transient_failures.load(Ordering::SeqCst) > 0 {
                self.transient_failures.fetch_sub(1, Ordering::SeqCst);
                return Err(parser::ParseError {
                    message: "injected transient failure".to_string(),
                    offset: 0,
                });
            }
        }
        parser::parse(source)
    }

    /// Makes the next `count` parse attempts fail, simulating the transient
    /// compile failures the retry budget exists for.
    #[cfg(test)]
    pub(crate) fn inject_transient_failures(&self, count: usize) {
        self.transient_failures.store(count, std::sync::atomic::Ordering::SeqCst);
    }
}

impl Default for TemplateCompiler {
    fn default() -> Self {
        Self::new()
    }
}
