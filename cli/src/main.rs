use clap::{Parser, Subcommand};
use gridtrace_common::board::model::BoardModel;
use gridtrace_common::util::config::Config;
use gridtrace_common::util::{check, generator, logger, visualization};
use gridtrace_router::report::{Progress, ProgressSink};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Route every net of a board and write the routed result.
    Route {
        /// Input board; falls back to [input].board_file from the config.
        #[arg(long, value_name = "FILE")]
        board: Option<String>,
        /// Routed board; falls back to [output].board_out from the config.
        #[arg(long, value_name = "FILE")]
        output: Option<String>,
    },
    /// Verify clearances and connectivity of a routed board.
    Check {
        #[arg(long, value_name = "FILE")]
        board: Option<String>,
    },
    /// Draw a board to a PNG.
    Render {
        #[arg(long, value_name = "FILE")]
        board: Option<String>,
        #[arg(long, value_name = "FILE")]
        output: Option<String>,
    },
    Generate {
        #[arg(long, default_value_t = 12)]
        nets: usize,
        #[arg(long, default_value_t = 2)]
        pairs: usize,
        #[arg(long, default_value_t = 3)]
        keepouts: usize,
        #[arg(long, default_value_t = 42)]
        seed: u64,
        #[arg(long, default_value = "inputs/board.json")]
        output: String,
    },
}

fn main() -> anyhow::Result<()> {
    logger::init();
    let args = Args::parse();

    let config = if args.config.exists() {
        log::info!("Loading configuration from {:?}", args.config);
        let config_str = std::fs::read_to_string(&args.config)
            .map_err(|e| anyhow::anyhow!("Failed to read config file: {}", e))?;
        toml::from_str(&config_str)
            .map_err(|e| anyhow::anyhow!("Failed to parse config TOML: {}", e))?
    } else {
        log::warn!(
            "Configuration file {:?} not found. Using internal defaults.",
            args.config
        );
        Config::default()
    };
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid configuration: {}", e))?;

    match args.command {
        Commands::Generate {
            nets,
            pairs,
            keepouts,
            seed,
            output,
        } => {
            let board = generator::generate_random_board(nets, pairs, keepouts, seed);
            save_board(&board, &output)?;
            log::info!("Generated: {}", output);
        }
        Commands::Route { board, output } => {
            let board = board.unwrap_or_else(|| config.input.board_file.clone());
            let output = output.unwrap_or_else(|| config.output.board_out.clone());
            if !Path::new(&board).exists() {
                return Err(anyhow::anyhow!(
                    "Input board missing: '{}'. Did you run 'generate'?",
                    board
                ));
            }

            if run_routing(&config, &board, &output).is_err() {
                std::process::exit(1);
            }
        }
        Commands::Check { board } => {
            let path = board.unwrap_or_else(|| config.output.board_out.clone());
            let board = load_board(&path)?;
            check::run(&board, &config.rules)
                .map_err(|e| anyhow::anyhow!("Verification Failed: {}", e))?;
        }
        Commands::Render { board, output } => {
            let path = board.unwrap_or_else(|| config.output.board_out.clone());
            let output = output.unwrap_or_else(|| config.output.image_out.clone());
            let board = load_board(&path)?;
            prepare_output_dir(&output)?;
            log::info!("Rendering {} ...", output);
            visualization::draw_routed_board(
                &board,
                &output,
                config.output.image_width,
                config.output.image_height,
            );
        }
    }

    Ok(())
}

fn run_routing(config: &Config, board_path: &str, output: &str) -> anyhow::Result<()> {
    let mut board = load_board(board_path)?;
    log::info!(
        "Loaded board: {} nets, {} pads, {} layers",
        board.num_nets(),
        board.pads.len(),
        board.num_layers()
    );

    log::info!("Starting Routing...");
    let report = gridtrace_router::route_board(&mut board, config, &mut LogSink)
        .map_err(|e| anyhow::anyhow!(e))?;

    if config.output.render {
        log::info!("Generating routed visualization...");
        prepare_output_dir(&config.output.image_out)?;
        visualization::draw_routed_board(
            &board,
            &config.output.image_out,
            config.output.image_width,
            config.output.image_height,
        );
    }

    check::run(&board, &config.rules)
        .map_err(|e| anyhow::anyhow!("Verification Failed: {}", e))?;

    save_board(&board, output)?;
    log::info!("Routed board written to {}", output);

    if report.failed() > 0 {
        return Err(anyhow::anyhow!("{} net(s) could not be routed", report.failed()));
    }
    Ok(())
}

/// Forwards batch progress to the logger. Frontier snapshots are volume, so
/// they stay at debug level.
struct LogSink;

impl ProgressSink for LogSink {
    fn event(&mut self, progress: Progress<'_>) {
        match progress {
            Progress::NetStarted {
                index, total, name, ..
            } => {
                log::info!("[{}/{}] Routing '{}'", index + 1, total, name);
            }
            Progress::Searching { snapshot, .. } => {
                log::debug!(
                    "  searching: {} iterations, {} open, {} closed",
                    snapshot.iterations,
                    snapshot.open.len(),
                    snapshot.closed.len()
                );
            }
            Progress::NetDone { .. } => {}
        }
    }
}

fn load_board(path: &str) -> anyhow::Result<BoardModel> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("Failed to read board file '{}': {}", path, e))?;
    let mut board: BoardModel = serde_json::from_str(&text)
        .map_err(|e| anyhow::anyhow!("Invalid board JSON in '{}': {}", path, e))?;
    board.reindex();
    Ok(board)
}

fn save_board(board: &BoardModel, path: &str) -> anyhow::Result<()> {
    prepare_output_dir(path)?;
    let text = serde_json::to_string_pretty(board)?;
    std::fs::write(path, text)
        .map_err(|e| anyhow::anyhow!("Failed to write board file '{}': {}", path, e))?;
    Ok(())
}

fn prepare_output_dir(path_str: &str) -> anyhow::Result<()> {
    if let Some(parent) = Path::new(path_str).parent() {
        if !parent.exists() && !parent.as_os_str().is_empty() {
            log::info!("Creating output directory: {:?}", parent);
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}
