// build.rs

use clap::{Arg, ArgAction, Command};
use clap_mangen::Man;
use std::env;
use std::fs;
use std::path::PathBuf;

fn seeds_arg() -> Arg {
    Arg::new("seeds")
        .num_args(0..)
        .help("Seed packages (defaults to every scene package)")
}

fn build_cli() -> Command {
    Command::new("varkeep")
        .version(env!("CARGO_PKG_VERSION"))
        .author("varkeep contributors")
        .about("Keep only the VaM packages your scenes need")
        .subcommand_required(true)
        .arg(
            Arg::new("root")
                .short('r')
                .long("root")
                .value_name("DIR")
                .global(true)
                .help("VaM install directory (defaults to vam_dir from the config file)"),
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("PATH")
                .global(true)
                .help("Config file"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Debug logging (overrides RUST_LOG)"),
        )
        .arg(
            Arg::new("json")
                .long("json")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Print reports as JSON"),
        )
        .subcommand(
            Command::new("scan")
                .about("Scan packages and refresh the cache")
                .arg(
                    Arg::new("rescan")
                        .long("rescan")
                        .action(ArgAction::SetTrue)
                        .help("Ignore the cache and rescan every package"),
                ),
        )
        .subcommand(
            Command::new("scenes")
                .about("List scenes found in packages and in Saves/scene")
                .arg(
                    Arg::new("package")
                        .short('p')
                        .long("package")
                        .help("Only scenes from this package"),
                )
                .arg(
                    Arg::new("looks")
                        .long("looks")
                        .action(ArgAction::SetTrue)
                        .help("Flag scenes that only feature female looks"),
                ),
        )
        .subcommand(
            Command::new("deps")
                .about("Show how a package's dependencies resolve")
                .arg(Arg::new("package").required(true).help("Package filename")),
        )
        .subcommand(
            Command::new("resolve")
                .about("Compute which packages to keep")
                .arg(seeds_arg())
                .arg(
                    Arg::new("unused")
                        .long("unused")
                        .action(ArgAction::SetTrue)
                        .help("Also list unused packages"),
                ),
        )
        .subcommand(
            Command::new("disable")
                .about("Start a session: disable every package the seeds do not need")
                .arg(seeds_arg()),
        )
        .subcommand(
            Command::new("reconcile")
                .about("Move an active session to a new seed set")
                .arg(seeds_arg()),
        )
        .subcommand(Command::new("restore").about("Restore every disabled package and end the session"))
        .subcommand(Command::new("status").about("Show package and session state"))
        .subcommand(Command::new("recover").about("Recover from an interrupted run"))
        .subcommand(
            Command::new("completions")
                .about("Generate shell completion scripts")
                .arg(
                    Arg::new("shell")
                        .required(true)
                        .value_parser(["bash", "elvish", "fish", "powershell", "zsh"])
                        .help("Shell to generate completions for"),
                ),
        )
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    // Create man directory
    let out_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").unwrap());
    let man_dir = out_dir.join("man");
    fs::create_dir_all(&man_dir).expect("Failed to create man directory");

    let man = Man::new(build_cli());
    let mut buffer = Vec::new();
    man.render(&mut buffer).expect("Failed to render man page");

    let man_path = man_dir.join("varkeep.1");
    fs::write(&man_path, buffer).expect("Failed to write man page");
}
