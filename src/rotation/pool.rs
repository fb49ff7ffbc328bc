//! Ordered, cyclic proxy pool

use crate::error::{Result, RotaError};
use crate::models::{parse_proxy_list, ProxyId};

/// Ordered collection of proxies with a cursor on the active one.
///
/// The cursor is always a valid index while the pool is non-empty.
#[derive(Debug, Clone, Default)]
pub struct ProxyPool {
    entries: Vec<ProxyId>,
    active_index: usize,
}

impl ProxyPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the pool and move the cursor back to the first entry.
    ///
    /// Blank entries are dropped; if nothing remains the pool is left
    /// untouched and `EmptyPool` is returned.
    pub fn load<I, S>(&mut self, entries: I) -> Result<usize>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let parsed: Vec<ProxyId> = entries
            .into_iter()
            .filter_map(|e| ProxyId::parse(e.as_ref()))
            .collect();

        if parsed.is_empty() {
            return Err(RotaError::EmptyPool);
        }

        self.entries = parsed;
        self.active_index = 0;
        Ok(self.entries.len())
    }

    /// Load a newline-delimited proxy list
    pub fn load_text(&mut self, text: &str) -> Result<usize> {
        let parsed = parse_proxy_list(text);
        self.load(parsed.iter().map(|p| p.as_str()))
    }

    /// The active proxy, or `None` when the pool is empty
    pub fn current(&self) -> Option<&ProxyId> {
        self.entries.get(self.active_index)
    }

    /// Move the cursor to the next entry, wrapping at the end
    pub fn advance(&mut self) {
        if self.entries.is_empty() {
            return;
        }
        self.active_index = (self.active_index + 1) % self.entries.len();
    }

    /// Move the cursor back to the first entry
    pub fn rewind(&mut self) {
        self.active_index = 0;
    }

    /// Cursor position; `None` when the pool is empty
    pub fn active_index(&self) -> Option<usize> {
        if self.entries.is_empty() {
            None
        } else {
            Some(self.active_index)
        }
    }

    pub fn size(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[ProxyId] {
        &self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_pool_has_no_current() {
        let pool = ProxyPool::new();
        assert!(pool.current().is_none());
        assert!(pool.active_index().is_none());
        assert_eq!(pool.size(), 0);
    }

    #[test]
    fn test_load_rejects_empty_and_keeps_state() {
        let mut pool = ProxyPool::new();
        pool.load(["p1", "p2"]).unwrap();
        pool.advance();

        assert!(matches!(pool.load(Vec::<String>::new()), Err(RotaError::EmptyPool)));
        assert!(matches!(pool.load(["", "  ", "\t"]), Err(RotaError::EmptyPool)));
        assert!(matches!(pool.load_text("\n\r\n  \n"), Err(RotaError::EmptyPool)));

        assert_eq!(pool.size(), 2);
        assert_eq!(pool.current().unwrap().as_str(), "p2");
    }

    #[test]
    fn test_load_resets_cursor() {
        let mut pool = ProxyPool::new();
        pool.load(["p1", "p2", "p3"]).unwrap();
        pool.advance();
        pool.advance();
        assert_eq!(pool.active_index(), Some(2));

        assert_eq!(pool.load(["q1", "", "q2"]).unwrap(), 2);
        assert_eq!(pool.active_index(), Some(0));
        assert_eq!(pool.current().unwrap().as_str(), "q1");
    }

    #[test]
    fn test_advance_wraps() {
        let mut pool = ProxyPool::new();
        pool.load_text("p1\np2\np3").unwrap();

        let mut seen = Vec::new();
        for _ in 0..6 {
            seen.push(pool.current().unwrap().as_str().to_string());
            pool.advance();
        }
        assert_eq!(seen, vec!["p1", "p2", "p3", "p1", "p2", "p3"]);
    }

    #[test]
    fn test_cursor_after_n_advances_is_n_mod_k() {
        for k in 1..=5usize {
            let mut pool = ProxyPool::new();
            pool.load((0..k).map(|i| format!("proxy{}", i))).unwrap();
            for n in 1..=17usize {
                pool.advance();
                assert_eq!(pool.active_index(), Some(n % k));
            }
        }
    }

    #[test]
    fn test_advance_on_empty_is_noop() {
        let mut pool = ProxyPool::new();
        pool.advance();
        assert!(pool.active_index().is_none());
    }

    #[test]
    fn test_rewind() {
        let mut pool = ProxyPool::new();
        pool.load(["p1", "p2"]).unwrap();
        pool.advance();
        pool.rewind();
        assert_eq!(pool.current().unwrap().as_str(), "p1");
    }
}
