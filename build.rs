use std::path::PathBuf;

// The generated bindings under src/api/generated are checked in. Set
// TALOS_REGENERATE_PROTO=1 (requires protoc) to rebuild them from proto/.
fn main() {
    println!("cargo:rerun-if-changed=proto/common/common.proto");
    println!("cargo:rerun-if-changed=proto/machine/machine.proto");
    println!("cargo:rerun-if-env-changed=TALOS_REGENERATE_PROTO");

    if std::env::var_os("TALOS_REGENERATE_PROTO").is_none() {
        return;
    }

    let out_dir = PathBuf::from("src/api/generated");
    std::fs::create_dir_all(&out_dir).expect("create generated dir");

    tonic_prost_build::configure()
        .out_dir(&out_dir)
        .build_server(false)
        .compile_protos(
            &["proto/common/common.proto", "proto/machine/machine.proto"],
            &["proto"],
        )
        .expect("compile protos");

    for name in ["common.rs", "machine.rs"] {
        let generated_file = out_dir.join(name);
        if generated_file.exists() {
            let content = std::fs::read_to_string(&generated_file).expect("read generated");
            let new_content = format!(
                "// SPDX-License-Identifier: MIT OR Apache-2.0\n// DO NOT EDIT\n{}",
                content
            );
            std::fs::write(generated_file, new_content).expect("write generated");
        }
    }
}
