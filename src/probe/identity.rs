use std::sync::atomic::{AtomicUsize, Ordering};

/// Realistic browser User-Agents rotated across requests.
const BROWSER_USER_AGENTS: &[&str] = &[
    // Chrome on Windows
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    // Chrome on macOS
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    // Firefox on Windows
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0",
    // Safari on macOS
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.2 Safari/605.1.15",
    // Firefox on Linux
    "Mozilla/5.0 (X11; Linux x86_64; rv:121.0) Gecko/20100101 Firefox/121.0",
];

const ACCEPT_LANGUAGES: &[&str] = &["en-US,en;q=0.9", "en-GB,en;q=0.9", "en-US,en;q=0.8,de;q=0.5"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_agent: String,
    pub accept_language: String,
}

/// Round-robin pool of identity headers.
pub struct IdentityPool {
    agents: Vec<String>,
    languages: Vec<String>,
    counter: AtomicUsize,
}

impl IdentityPool {
    /// Empty lists fall back to the built-in browser pool.
    pub fn new(agents: &[String], languages: &[String]) -> Self {
        let or_default = |given: &[String], fallback: &[&str]| -> Vec<String> {
            if given.is_empty() {
                fallback.iter().map(|s| s.to_string()).collect()
            } else {
                given.to_vec()
            }
        };
        Self {
            agents: or_default(agents, BROWSER_USER_AGENTS),
            languages: or_default(languages, ACCEPT_LANGUAGES),
            counter: AtomicUsize::new(0),
        }
    }

    pub fn next(&self) -> Identity {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        Identity {
            user_agent: self.agents[n % self.agents.len()].clone(),
            accept_language: self.languages[n % self.languages.len()].clone(),
        }
    }

    pub fn size(&self) -> usize {
        self.agents.len()
    }
}

impl Default for IdentityPool {
    fn default() -> Self {
        Self::new(&[], &[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rotates_through_pool() {
        let pool = IdentityPool::new(&["a".to_string(), "b".to_string()], &[]);
        assert_eq!(pool.next().user_agent, "a");
        assert_eq!(pool.next().user_agent, "b");
        assert_eq!(pool.next().user_agent, "a");
    }

    #[test]
    fn test_default_pool_is_browser_like() {
        let pool = IdentityPool::default();
        assert_eq!(pool.size(), BROWSER_USER_AGENTS.len());
        assert!(pool.next().user_agent.starts_with("Mozilla/5.0"));
    }
}
