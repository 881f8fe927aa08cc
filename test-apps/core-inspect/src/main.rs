use clap::Parser;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "core-inspect")]
#[command(about = "Print the threads, mappings and crash of a core file")]
struct Cli {
    /// ELF core file of the crashed process
    core: PathBuf,

    /// Directory holding a copy of the crashed process's /proc/<pid>
    procfs_dir: PathBuf,

    /// Resolve mapped file paths below this directory instead of /
    #[arg(short, long)]
    root: Option<PathBuf>,

    /// Process id, used only when the core does not record it
    #[arg(short, long, default_value_t = 0)]
    pid: i32,

    /// Print JSON instead of text
    #[arg(long)]
    json: bool,
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    if let Err((stage, message)) = inspect::run(&cli) {
        eprintln!("core-inspect: {stage} failed: {message}");
        std::process::exit(1);
    }
}

#[cfg(any(target_os = "linux", target_os = "android"))]
mod inspect {
    use {
        super::Cli,
        error_graph::ErrorList,
        postmortem_dumper::{
            errors::InitError, CoreDumper, CrashInfo, Dumper, MappingInfo, ThreadInfo,
        },
        std::{
            ffi::OsStr,
            path::{Path, PathBuf},
        },
    };

    type Failure = (&'static str, String);
    type SoftErrors = ErrorList<InitError>;

    #[derive(serde::Serialize)]
    struct Thread {
        #[serde(flatten)]
        info: ThreadInfo,
        stack_base: Option<u64>,
        stack_len: Option<usize>,
    }

    #[derive(serde::Serialize)]
    struct Mapping<'a> {
        #[serde(flatten)]
        info: &'a MappingInfo,
        resolved_path: Option<PathBuf>,
    }

    #[derive(serde::Serialize)]
    struct Report<'a> {
        crash: Option<&'a CrashInfo>,
        threads: Vec<Thread>,
        mappings: Vec<Mapping<'a>>,
        soft_errors: &'a SoftErrors,
    }

    pub fn run(cli: &Cli) -> Result<(), Failure> {
        let mut dumper = CoreDumper::new(cli.pid, &cli.core, &cli.procfs_dir);
        if let Some(root) = &cli.root {
            dumper = dumper.with_root_prefix(root);
        }

        let mut soft_errors = SoftErrors::default();
        dumper
            .init_report_soft_errors(&mut soft_errors)
            .map_err(|e| ("init", e.to_string()))?;
        for error in soft_errors.iter() {
            log::warn!("{error}");
        }

        let threads = (0..dumper.threads().len())
            .map(|index| {
                let info = dumper
                    .get_thread_info_by_index(index)
                    .map_err(|e| ("threads", e.to_string()))?;
                let stack = dumper.get_stack_info(info.stack_pointer).ok();
                Ok(Thread {
                    stack_base: stack.map(|(base, _)| base),
                    stack_len: stack.map(|(_, len)| len),
                    info,
                })
            })
            .collect::<Result<Vec<_>, Failure>>()?;

        let mappings: Vec<_> = dumper
            .mappings()
            .iter()
            .map(|info| Mapping {
                info,
                resolved_path: dumper.get_mapping_absolute_path(info).ok(),
            })
            .collect();
        if mappings.is_empty() {
            return Err(("mappings", "the core describes no mappings".to_owned()));
        }

        log::info!(
            "inspected {} with mappings resolved below {}",
            dumper.core_path().display(),
            dumper.root_prefix().unwrap_or(Path::new("/")).display()
        );
        let report = Report {
            crash: dumper.crash_info(),
            threads,
            mappings,
            soft_errors: &soft_errors,
        };
        if cli.json {
            let json =
                serde_json::to_string_pretty(&report).map_err(|e| ("output", e.to_string()))?;
            println!("{json}");
        } else {
            print_text(&report);
        }
        Ok(())
    }

    fn print_text(report: &Report<'_>) {
        if let Some(crash) = report.crash {
            println!(
                "crash: signal {} code {} address {:#x} thread {}",
                crash.signal, crash.signal_code, crash.address, crash.thread
            );
            if !crash.exception_info.is_empty() {
                println!("  exception info: {:x?}", crash.exception_info);
            }
        }

        println!("threads:");
        for thread in &report.threads {
            let info = &thread.info;
            print!(
                "  {:>7} ppid {} tgid {} pc {:#018x} sp {:#018x}",
                info.tid, info.ppid, info.tgid, info.instruction_pointer, info.stack_pointer
            );
            match (thread.stack_base, thread.stack_len) {
                (Some(base), Some(len)) => println!(" stack {base:#x}+{len:#x}"),
                _ => println!(" no stack"),
            }
        }

        println!("mappings:");
        for mapping in &report.mappings {
            let info = mapping.info;
            let name = match &mapping.resolved_path {
                Some(path) => path.as_os_str(),
                None => info.name().unwrap_or(OsStr::new("")),
            };
            println!(
                "  {:016x}-{:016x} {} {:08x} {}",
                info.start_address,
                info.end_address(),
                info.permissions.as_maps_str(),
                info.offset,
                name.to_string_lossy()
            );
        }
    }
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
mod inspect {
    pub fn run(_cli: &super::Cli) -> Result<(), (&'static str, String)> {
        Err(("init", "core files can only be inspected on Linux".to_owned()))
    }
}
