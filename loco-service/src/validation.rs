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

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// DNS-safe labels for workspace and resource names; they end up in
    /// namespaces and hostnames.
    static ref DNS_LABEL: Regex = Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?$").unwrap();
    static ref IMAGE: Regex = Regex::new(
        r"^([a-z0-9\-._]+(/[a-z0-9\-._]+)*)(:[a-z0-9\-._]+|@sha256:[a-f0-9]{64})?$"
    )
    .unwrap();
}

pub fn is_valid_dns_label(value: &str) -> bool {
    !value.is_empty() && value.len() <= 63 && DNS_LABEL.is_match(value)
}

pub fn is_valid_image(value: &str) -> bool {
    !value.is_empty() && IMAGE.is_match(value)
}

/// Full hostnames (user provided domains): dot-separated DNS labels.
pub fn is_valid_hostname(value: &str) -> bool {
    !value.is_empty()
        && value.len() <= 253
        && value.split('.').all(is_valid_dns_label)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dns_labels() {
        assert!(is_valid_dns_label("api"));
        assert!(is_valid_dns_label("my-service-2"));
        assert!(!is_valid_dns_label(""));
        assert!(!is_valid_dns_label("-leading"));
        assert!(!is_valid_dns_label("trailing-"));
        assert!(!is_valid_dns_label("UpperCase"));
        assert!(!is_valid_dns_label("under_score"));
        assert!(!is_valid_dns_label(&"a".repeat(64)));
    }

    #[test]
    fn hostnames() {
        assert!(is_valid_hostname("api.deploy-app.com"));
        assert!(is_valid_hostname("example.com"));
        assert!(!is_valid_hostname(""));
        assert!(!is_valid_hostname(".example.com"));
        assert!(!is_valid_hostname("exa_mple.com"));
    }

    #[test]
    fn images() {
        assert!(is_valid_image("nginx"));
        assert!(is_valid_image("nginx:1.25"));
        assert!(is_valid_image("ghcr.io/acme/api:latest"));
        assert!(is_valid_image(&format!("nginx@sha256:{}", "a".repeat(64))));
        assert!(!is_valid_image(""));
        assert!(!is_valid_image("Nginx:latest"));
        assert!(!is_valid_image("nginx:"));
        assert!(!is_valid_image("nginx@sha256:zzz"));
    }
}
