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

use loco_common::tracing::init_tracing;
use loco_common::SafeDisplay;
use loco_service::config::{make_config_loader, LocoServiceConfig};
use loco_service::{metrics, LocoService};
use tokio::task::JoinSet;
use tracing::info;

fn main() -> Result<(), anyhow::Error> {
    match make_config_loader().load_or_dump_config() {
        Some(config) => {
            init_tracing(&config.tracing);
            info!("Loco service config:\n{}", config.to_safe_string());

            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()?;
            runtime.block_on(async_main(config))
        }
        None => Ok(()),
    }
}

async fn async_main(config: LocoServiceConfig) -> Result<(), anyhow::Error> {
    let prometheus_registry = metrics::register_all();
    let service = LocoService::new(config, prometheus_registry).await?;

    let mut join_set = JoinSet::new();
    service.run(&mut join_set).await?;

    while let Some(result) = join_set.join_next().await {
        result??;
    }

    Ok(())
}
