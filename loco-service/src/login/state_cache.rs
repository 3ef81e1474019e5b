// Copyright 2024-2025 Loco Cloud
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use rand::Rng;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

const MAX_ENTRIES: usize = 10_000;

/// One-time OAuth state tokens: 32 random bytes as hex, held in process
/// memory with a bounded TTL. The cache is the only shared mutable state in
/// the process.
pub struct OAuthStateCache {
    ttl: Duration,
    entries: Mutex<HashMap<String, Instant>>,
}

impl OAuthStateCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn generate(&self) -> String {
        let mut bytes = [0u8; 32];
        rand::rng().fill(&mut bytes);
        let state = hex::encode(bytes);

        let now = Instant::now();
        let mut entries = self.entries.lock().unwrap();
        entries.retain(|_, expires_at| *expires_at > now);
        if entries.len() >= MAX_ENTRIES {
            // The cache is full of still-valid states; drop the one closest
            // to expiry rather than growing without bound.
            if let Some(oldest) = entries
                .iter()
                .min_by_key(|(_, expires_at)| **expires_at)
                .map(|(state, _)| state.clone())
            {
                entries.remove(&oldest);
            }
        }
        entries.insert(state.clone(), now + self.ttl);
        state
    }

    /// One-time take: a state validates at most once.
    pub fn take(&self, state: &str) -> bool {
        let now = Instant::now();
        let mut entries = self.entries.lock().unwrap();
        match entries.remove(state) {
            Some(expires_at) => expires_at > now,
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn states_are_one_time_use() {
        let cache = OAuthStateCache::new(Duration::from_secs(600));
        let state = cache.generate();
        assert_eq!(state.len(), 64);
        assert!(cache.take(&state));
        assert!(!cache.take(&state));
    }

    #[test]
    fn unknown_states_are_rejected() {
        let cache = OAuthStateCache::new(Duration::from_secs(600));
        assert!(!cache.take("deadbeef"));
    }

    #[test]
    fn expired_states_are_rejected() {
        let cache = OAuthStateCache::new(Duration::from_secs(0));
        let state = cache.generate();
        assert!(!cache.take(&state));
    }
}
