//! Builds `native/fixture.c` into a shared library for the integration tests.
//!
//! The library path is exported as `DYNBRIDGE_FIXTURE_LIB`. Without a working
//! C compiler the variable is simply not set and the fixture tests skip.

use std::env;
use std::path::PathBuf;

fn main() {
    println!("cargo:rerun-if-changed=native/fixture.c");

    let (Ok(out_dir), Ok(manifest_dir)) = (env::var("OUT_DIR"), env::var("CARGO_MANIFEST_DIR")) else {
        return;
    };
    let out_dir = PathBuf::from(out_dir);
    let source = PathBuf::from(manifest_dir).join("native").join("fixture.c");

    let library = match env::var("CARGO_CFG_TARGET_OS").as_deref() {
        Ok("windows") => "dynbridge_fixture.dll",
        Ok("macos") | Ok("ios") => "libdynbridge_fixture.dylib",
        _ => "libdynbridge_fixture.so",
    };
    let output = out_dir.join(library);

    let compiler = match cc::Build::new()
        .pic(true)
        .opt_level(1)
        .cargo_metadata(false)
        .try_get_compiler()
    {
        Ok(compiler) => compiler,
        Err(err) => {
            println!("cargo:warning=fixture library skipped: {}", err);
            return;
        }
    };

    let mut command = compiler.to_command();
    if compiler.is_like_msvc() {
        command
            .current_dir(&out_dir)
            .arg("/LD")
            .arg(&source)
            .arg(format!("/Fe{}", output.display()));
    } else {
        command.arg("-shared").arg("-o").arg(&output).arg(&source);
    }

    match command.status() {
        Ok(status) if status.success() => {
            println!("cargo:rustc-env=DYNBRIDGE_FIXTURE_LIB={}", output.display());
        }
        Ok(status) => println!("cargo:warning=fixture library skipped: compiler exited with {}", status),
        Err(err) => println!("cargo:warning=fixture library skipped: {}", err),
    }
}
