use std::process::ExitCode;
use clap::Parser;

use atmos_core::app::App;
use atmos_core::io;
use atmos_core::output::OutputRecord;
use atmos_core::time_integrator;

/// Non-hydrostatic Cartesian dynamical core.
#[derive(Parser, Debug)]
#[command(version = atmos_core::app::VERSION_AND_BUILD, about = atmos_core::app::DESCRIPTION)]
struct Cli {
    /// Preset name (see `--list-presets`) or a `.yaml`/`.cbor` config file.
    /// Ignored if `--restart-file` is given.
    #[arg(default_value = "smoke")]
    input: String,

    /// Additional `key=value` or `.yaml` overrides, applied in order after
    /// the named flags below.
    overrides: Vec<String>,

    #[arg(long)]
    resolution_x: Option<usize>,

    #[arg(long)]
    resolution_y: Option<usize>,

    #[arg(long)]
    levels: Option<usize>,

    #[arg(long)]
    horizontal_order: Option<usize>,

    #[arg(long)]
    vertical_order: Option<usize>,

    #[arg(long)]
    delta_t: Option<f64>,

    #[arg(long)]
    output_delta_t: Option<f64>,

    #[arg(long)]
    end_time: Option<f64>,

    /// Restart from a checkpoint file instead of `input`.
    #[arg(long)]
    restart_file: Option<String>,

    #[arg(long)]
    output_dir: Option<String>,

    /// Print the built-in preset names and exit.
    #[arg(long)]
    list_presets: bool,
}

impl Cli {
    /// Translate the named flags into `yaml_patch` `key=value` overrides,
    /// followed by whatever free-form overrides were given on the command
    /// line.
    fn overrides(&self) -> Vec<String> {
        let mut overrides = Vec::new();
        if let Some(v) = self.resolution_x { overrides.push(format!("mesh.resolution_x={v}")) }
        if let Some(v) = self.resolution_y { overrides.push(format!("mesh.resolution_y={v}")) }
        if let Some(v) = self.levels { overrides.push(format!("mesh.levels={v}")) }
        if let Some(v) = self.horizontal_order { overrides.push(format!("mesh.horizontal_order={v}")) }
        if let Some(v) = self.vertical_order { overrides.push(format!("mesh.vertical_order={v}")) }
        if let Some(v) = self.delta_t { overrides.push(format!("control.delta_t={v}")) }
        if let Some(v) = self.output_delta_t { overrides.push(format!("control.output_interval={v}")) }
        if let Some(v) = self.end_time { overrides.push(format!("control.final_time={v}")) }
        if let Some(v) = &self.output_dir { overrides.push(format!("control.output_directory={v}")) }
        overrides.extend(self.overrides.iter().cloned());
        overrides
    }
}

fn checkpoint_filename(output_directory: &str, time: f64) -> String {
    format!("{output_directory}/chkpt.{time:010.3}.cbor")
}

fn output_filename(output_directory: &str, time: f64) -> String {
    format!("{output_directory}/prods.{time:010.3}.cbor")
}

/// Drive the simulation from `app.config.control.start_time` to
/// `final_time`, performing checkpoint/output/progress side-effects at
/// the cadence `app.tasks` tracks. Returns whatever error aborted the run,
/// so `main` can distinguish a `DynCoreError::Solver` (recoverable in
/// principle, but this driver does not retry at a smaller step) from a
/// fatal configuration or I/O failure for the exit code.
fn run(cli: &Cli) -> anyhow::Result<()> {
    let overrides = cli.overrides();

    let mut app = match &cli.restart_file {
        Some(path) => App::from_file(path, overrides)?,
        None => App::from_preset_or_file(&cli.input, overrides)?,
    };
    app = app.validate()?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(app.config.control.num_threads())
        .enable_all()
        .build()?;

    let mut time = app.config.control.start_time;
    let final_time = app.config.control.final_time;
    let dt = app.config.control.delta_t;
    let fold = app.config.control.fold.max(1);
    let eqs = app.config.equation_set();
    let output_directory = app.config.control.output_directory.clone();
    let subtract_reference = app.config.control.subtract_reference;

    std::fs::create_dir_all(&output_directory)?;

    let mut iteration = 0usize;
    let start_instant = std::time::Instant::now();

    while time < final_time {
        for _ in 0..fold {
            if time >= final_time {
                break
            }
            runtime.block_on(time_integrator::step(&mut app.grid, &eqs, dt, &app.config.integrator))?;
            time += dt;
            iteration += 1;
        }

        app.tasks.report_progress.advance(0.0);
        println!(
            "[{:05}] t = {:.4}  ({:.2} steps/s)",
            iteration, time, iteration as f64 / start_instant.elapsed().as_secs_f64().max(1e-9),
        );

        if app.tasks.write_checkpoint.is_due(time) {
            let filename = checkpoint_filename(&output_directory, time);
            io::write_cbor(&filename, &app.to_checkpoint(time))?;
            app.tasks.write_checkpoint.advance(app.config.control.checkpoint_interval);
            println!("wrote {filename}");
        }

        if let Some(output_interval) = app.config.control.output_interval {
            if app.tasks.write_output.is_due(time) {
                let filename = output_filename(&output_directory, time);
                let record = OutputRecord::from_grid(&app.grid, "active", subtract_reference, time, &app.version)?;
                io::write_cbor(&filename, &record)?;
                app.tasks.write_output.advance(output_interval);
                println!("wrote {filename}");
            }
        }
    }

    let filename = checkpoint_filename(&output_directory, time);
    io::write_cbor(&filename, &app.to_checkpoint(time))?;
    println!("wrote {filename}");
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if cli.list_presets {
        for (name, _) in App::presets() {
            println!("{name}");
        }
        return ExitCode::SUCCESS
    }

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("error: {error:#}");
            ExitCode::FAILURE
        }
    }
}
