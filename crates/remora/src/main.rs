mod format;

use std::path::PathBuf;
use std::process;

use clap::{Args, Parser, Subcommand};
use format::{describe_protection, format_hexdump, parse_address, parse_hex_bytes, parse_length, HexBytes};
use remora_core::{memory, Address, Pattern, ProcessContext, ProcessId, Result as RemoraResult};
use remora_utils::{info, init_logging, LogConfig, LogLevel};

/// Attach to or launch a process and read, write, allocate and scan its memory.
#[derive(Parser, Debug)]
#[command(name = "remora")]
#[command(version)]
#[command(about = "Attach to or launch a process and read, write, allocate and scan its memory", long_about = None)]
struct Cli
{
    /// Log level (error, warn, info, debug, trace); overrides RUST_LOG
    #[arg(long, global = true)]
    log_level: Option<LogLevelArg>,

    #[command(subcommand)]
    command: Commands,
}

/// Wrapper so clap can parse [`LogLevel`] through its `FromStr`
#[derive(Debug, Clone, Copy)]
struct LogLevelArg(LogLevel);

impl std::str::FromStr for LogLevelArg
{
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        s.parse().map(LogLevelArg)
    }
}

/// Which process to operate on
#[derive(Args, Debug, Clone, Default)]
struct TargetArgs
{
    /// Process ID to attach to
    #[arg(long, conflicts_with = "name")]
    pid: Option<u32>,
    /// Attach to the first process with this executable name
    #[arg(long)]
    name: Option<String>,
}

impl TargetArgs
{
    /// Open the selected process, or this one when nothing is selected
    fn open(&self) -> RemoraResult<ProcessContext>
    {
        match (&self.pid, &self.name) {
            (Some(pid), _) => ProcessContext::attach_by_id(ProcessId::from(*pid)),
            (None, Some(name)) => ProcessContext::attach_by_name(name),
            (None, None) => Ok(ProcessContext::current()),
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands
{
    /// Launch a program suspended before its first instruction
    Launch
    {
        /// Path to the executable to launch
        program: PathBuf,
        /// Arguments to pass to the program
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
        /// Let the process run right away
        #[arg(long, default_value_t = false)]
        resume: bool,
    },
    /// Read memory and print a hexdump
    Read
    {
        #[command(flatten)]
        target: TargetArgs,
        /// Address to read from (hex 0x1000 or decimal)
        #[arg(value_parser = parse_address)]
        address: Address,
        /// Number of bytes to read
        #[arg(short, long, default_value = "64", value_parser = parse_length)]
        length: usize,
        /// Make the range readable for the duration of the read
        #[arg(long, default_value_t = false)]
        safe: bool,
    },
    /// Write bytes given as hex
    Write
    {
        #[command(flatten)]
        target: TargetArgs,
        /// Address to write to (hex 0x1000 or decimal)
        #[arg(value_parser = parse_address)]
        address: Address,
        /// Bytes to write, e.g. "90 90 c3"
        #[arg(value_parser = parse_hex_bytes)]
        bytes: HexBytes,
        /// Make the range writable for the duration of the write
        #[arg(long, default_value_t = false)]
        safe: bool,
    },
    /// Allocate read/write/execute memory
    Alloc
    {
        #[command(flatten)]
        target: TargetArgs,
        /// Number of bytes
        #[arg(value_parser = parse_length)]
        length: usize,
    },
    /// Free memory allocated with `alloc`
    Free
    {
        #[command(flatten)]
        target: TargetArgs,
        /// Base address returned by `alloc`
        #[arg(value_parser = parse_address)]
        address: Address,
    },
    /// Show the page protection of a range, one line per run
    Protection
    {
        #[command(flatten)]
        target: TargetArgs,
        /// Address to query
        #[arg(value_parser = parse_address)]
        address: Address,
        /// Length of the range
        #[arg(short, long, default_value = "1", value_parser = parse_length)]
        length: usize,
    },
    /// Find a byte signature such as "48 8B ?? 05" in a file or live memory
    Scan
    {
        #[command(flatten)]
        target: TargetArgs,
        /// Signature with `?`/`??` wildcards
        signature: String,
        /// Scan a dumped file instead of a live process
        #[arg(long, conflicts_with_all = ["address", "pid", "name"])]
        file: Option<PathBuf>,
        /// Start of the live region
        #[arg(long, requires = "length", value_parser = parse_address)]
        address: Option<Address>,
        /// Length of the live region
        #[arg(short, long, value_parser = parse_length)]
        length: Option<usize>,
        /// Report every match in a file, not only the first
        #[arg(long, default_value_t = false, requires = "file")]
        all: bool,
    },
    /// Show information about the target process
    Info
    {
        #[command(flatten)]
        target: TargetArgs,
    },
}

/// Linux and macOS contexts only free what they allocated themselves
const SESSION_SCOPED_FREE: bool = cfg!(unix);

fn main()
{
    let cli = Cli::parse();

    let config = match LogConfig::from_env() {
        Ok(config) => config.with_level(cli.log_level.map(|level| level.0)),
        Err(e) => {
            eprintln!("Failed to initialize logging: {e}");
            process::exit(1);
        }
    };
    let _log_guard = match init_logging(config) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {e}");
            process::exit(1);
        }
    };

    if let Err(e) = run_command(cli.command) {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run_command(command: Commands) -> Result<(), Box<dyn std::error::Error>>
{
    match command {
        Commands::Launch { program, args, resume } => {
            info!("Launching program: {} with args: {:?}", program.display(), args);
            let mut ctx = ProcessContext::launch(&program, &args)?;
            println!(
                "Launched {} (PID: {}, thread: {}), suspended",
                program.display(),
                ctx.process_id(),
                ctx.thread_id()
            );

            if resume {
                ctx.resume()?;
                println!("Process resumed and running");
            }
            Ok(())
        }
        Commands::Read {
            target,
            address,
            length,
            safe,
        } => {
            let ctx = target.open()?;
            let bytes = if safe {
                memory::read_bytes_safe(&ctx, address, length)?
            } else {
                memory::read_bytes(&ctx, address, length)?
            };
            print!("{}", format_hexdump(address, &bytes, 16));
            Ok(())
        }
        Commands::Write {
            target,
            address,
            bytes,
            safe,
        } => {
            let ctx = target.open()?;
            let bytes = bytes.0;
            if safe {
                memory::write_bytes_safe(&ctx, address, &bytes)?;
            } else {
                memory::write_bytes(&ctx, address, &bytes)?;
            }
            println!("Wrote {} bytes at {address}", bytes.len());
            Ok(())
        }
        Commands::Alloc { target, length } => {
            let ctx = target.open()?;
            if ctx.is_current() {
                return Err("alloc needs --pid or --name: memory allocated in this process is gone when the command exits".into());
            }
            let base = memory::allocate(&ctx, length)?;
            println!("Allocated {length} bytes at {base} in process {}", ctx.process_id());
            if SESSION_SCOPED_FREE {
                println!("Note: a later `remora free` cannot release it on this platform; it stays mapped until the process exits");
            }
            Ok(())
        }
        Commands::Free { target, address } => {
            let ctx = target.open()?;
            if memory::free(&ctx, address) {
                println!("Freed {address}");
                Ok(())
            } else if SESSION_SCOPED_FREE {
                Err(format!(
                    "could not free {address} in process {}: on this platform only memory allocated by the same remora invocation can be freed",
                    ctx.process_id()
                )
                .into())
            } else {
                Err(format!("could not free {address} in process {}", ctx.process_id()).into())
            }
        }
        Commands::Protection {
            target,
            address,
            length,
        } => {
            let ctx = target.open()?;
            for run in memory::protection_map(&ctx, address, length)? {
                println!("{}-{}: {}", run.address, run.end(), describe_protection(run.protection));
            }
            Ok(())
        }
        Commands::Scan {
            target,
            signature,
            file,
            address,
            length,
            all,
        } => {
            let pattern: Pattern = signature.parse()?;
            match (file, address, length) {
                (Some(path), _, _) => {
                    let region = std::fs::read(&path)?;
                    info!("Scanning {} ({} bytes) for {}", path.display(), region.len(), pattern);
                    let offsets = if all {
                        pattern.find_all_in(&region)
                    } else {
                        pattern.find_in(&region).into_iter().collect()
                    };
                    if offsets.is_empty() {
                        println!("Not found");
                    }
                    for offset in offsets {
                        println!("0x{offset:x}");
                    }
                    Ok(())
                }
                (None, Some(base), Some(length)) => {
                    let ctx = target.open()?;
                    match memory::scan(&ctx, base, length, &pattern)? {
                        Some(found) => println!("{found} (offset 0x{:x})", found - base),
                        None => println!("Not found"),
                    }
                    Ok(())
                }
                _ => Err("scan needs --file, or --address with --length".into()),
            }
        }
        Commands::Info { target } => {
            let ctx = target.open()?;
            print_process_info(&ctx);
            Ok(())
        }
    }
}

fn print_process_info(ctx: &ProcessContext)
{
    println!("Process Information:");
    println!("  PID: {}", ctx.process_id());
    println!("  Primary Thread: {}", ctx.thread_id());
    println!("  Creation Mode: {}", ctx.creation_mode());
    println!("  Current Process: {}", ctx.is_current());
    println!("  Suspended: {}", ctx.is_suspended());
    println!("  Pointer Width: {} bits", usize::BITS);
}

#[cfg(test)]
mod tests
{
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_definition_is_valid()
    {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_read_with_hex_address()
    {
        let cli = Cli::try_parse_from(["remora", "read", "--pid", "42", "0x7ff0", "-l", "0x20", "--safe"]).unwrap();
        match cli.command {
            Commands::Read {
                target,
                address,
                length,
                safe,
            } => {
                assert_eq!(target.pid, Some(42));
                assert_eq!(address, Address::from(0x7ff0u64));
                assert_eq!(length, 0x20);
                assert!(safe);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_pid_and_name_conflict()
    {
        assert!(Cli::try_parse_from(["remora", "info", "--pid", "1", "--name", "game"]).is_err());
    }

    #[test]
    fn test_launch_keeps_hyphenated_args()
    {
        let cli = Cli::try_parse_from(["remora", "launch", "./game", "--windowed", "-w", "800"]).unwrap();
        match cli.command {
            Commands::Launch { program, args, resume } => {
                assert_eq!(program, PathBuf::from("./game"));
                assert_eq!(args, vec!["--windowed", "-w", "800"]);
                assert!(!resume);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_write_parses_hex_bytes()
    {
        let cli = Cli::try_parse_from(["remora", "write", "4096", "90 90 c3"]).unwrap();
        match cli.command {
            Commands::Write { address, bytes, .. } => {
                assert_eq!(address, Address::from(4096u64));
                assert_eq!(bytes.0, vec![0x90, 0x90, 0xc3]);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_alloc_without_target_is_refused()
    {
        let cli = Cli::try_parse_from(["remora", "alloc", "64"]).unwrap();
        let err = run_command(cli.command).unwrap_err();
        assert!(err.to_string().contains("--pid or --name"));
    }

    #[test]
    fn test_global_log_level()
    {
        let cli = Cli::try_parse_from(["remora", "info", "--log-level", "debug"]).unwrap();
        assert!(matches!(cli.log_level, Some(LogLevelArg(LogLevel::Debug))));
        assert!(Cli::try_parse_from(["remora", "info", "--log-level", "loud"]).is_err());
    }

    #[test]
    fn test_default_target_is_current_process()
    {
        let ctx = TargetArgs::default().open().unwrap();
        assert!(ctx.is_current());
    }

    #[test]
    fn test_scan_live_round_trip()
    {
        let haystack: Vec<u8> = (0u8..=255).collect();
        let ctx = ProcessContext::current();
        let base = Address::from_ptr(haystack.as_ptr());
        let pattern: Pattern = "10 ?? 12".parse().unwrap();
        let found = memory::scan(&ctx, base, haystack.len(), &pattern).unwrap();
        assert_eq!(found, Some(base + 0x10));
    }
}
