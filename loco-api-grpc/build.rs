use std::env;
use std::path::PathBuf;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let out_dir = PathBuf::from(env::var("OUT_DIR").unwrap());

    tonic_build::configure()
        .file_descriptor_set_path(out_dir.join("services.bin"))
        .include_file("mod.rs")
        .compile_protos(
            &[
                "proto/loco/common.proto",
                "proto/loco/user/v1/user_service.proto",
                "proto/loco/organization/v1/organization_service.proto",
                "proto/loco/workspace/v1/workspace_service.proto",
                "proto/loco/resource/v1/resource_service.proto",
                "proto/loco/deployment/v1/deployment_service.proto",
                "proto/loco/domain/v1/domain_service.proto",
                "proto/loco/token/v1/token_service.proto",
                "proto/loco/oauth/v1/oauth_service.proto",
            ],
            &["proto"],
        )?;

    Ok(())
}
