//!! This build script validates the embedded resource descriptor table (`src/config/default_resources.json`)

#![allow(dead_code, reason = "Some items may be unused in this build script context")]

use ohno::IntoAppError;

type Result<T, E = ohno::AppError> = core::result::Result<T, E>;

use std::process;

#[path = "src/config/descriptors.rs"]
mod descriptors;

fn main() {
    match inner_main() {
        Ok(warnings) => {
            if !warnings.is_empty() {
                for warning in warnings {
                    eprintln!("cargo:warning=Resource table validation warning: {warning}");
                }

                process::exit(1);
            }

            println!("cargo:rerun-if-changed=src/config/default_resources.json");
            process::exit(0);
        }
        Err(e) => {
            eprintln!("unable to load default_resources.json: {e:?}");
            process::exit(1);
        }
    }
}

fn inner_main() -> Result<Vec<String>> {
    let table = descriptors::DescriptorTable::builtin().into_app_err("unable to parse default_resources.json")?;
    Ok(table.validate())
}
