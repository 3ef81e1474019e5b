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

use crate::model::Token;
use loco_common::model::auth::{Entity, EntityScope, EntityType, ScopeLevel};
use loco_common::model::UserId;

/// The verified bearer of a request: the token row plus the entity and
/// token-scopes it carries. Token scopes may be narrower than the underlying
/// user's scopes; policy checks only ever see what the token carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenAuthorisation {
    pub token: Token,
}

impl TokenAuthorisation {
    pub fn new(token: Token) -> Self {
        Self { token }
    }

    pub fn entity(&self) -> Entity {
        self.token.entity
    }

    pub fn scopes(&self) -> &[EntityScope] {
        &self.token.scopes
    }

    pub fn is_user(&self) -> bool {
        self.token.entity.entity_type == EntityType::User
    }

    /// The bearer's user id, when the bearer is a user token.
    pub fn user_id(&self) -> Option<UserId> {
        if self.is_user() {
            Some(UserId(self.token.entity.entity_id))
        } else {
            None
        }
    }

    pub fn has_system_level(&self, level: ScopeLevel) -> bool {
        self.token.scopes.iter().any(|scope| {
            scope.entity.entity_type == EntityType::System && scope.level.covers(level)
        })
    }
}
