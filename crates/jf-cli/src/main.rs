//! jecfit CLI

mod report;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use jf_inference::{FitConfig, Fitter};
use jf_model::{
    CombinedLossFunction, CorrectionConstraint, CorrectionFunction, Measurement, Method,
    MultijetBalance, MultijetConfig, NuisanceRegistry, PhotonJet, PhotonJetConfig,
    create_correction,
};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "jecfit")]
#[command(about = "Global fit of the residual jet energy correction")]
#[command(version)]
struct Cli {
    /// Log verbosity level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "warn")]
    log_level: tracing::Level,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fit the correction to all requested measurements
    Fit {
        #[command(flatten)]
        setup: SetupArgs,

        /// Text file for the fit results
        #[arg(short, long, default_value = "fit.out")]
        output: PathBuf,

        /// Also write a JSON summary to this file
        #[arg(long)]
        json: Option<PathBuf>,

        /// Label of the data-taking period, stored in the JSON summary
        #[arg(long, default_value = "")]
        period: String,
    },

    /// Chi-square minimized over nuisances at fixed correction parameters
    Profile {
        #[command(flatten)]
        setup: SetupArgs,

        /// Comma-separated values of the correction parameters
        #[arg(long, value_delimiter = ',', allow_hyphen_values = true, required = true)]
        poi: Vec<f64>,

        /// Output file (pretty JSON). Defaults to stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print version
    Version,
}

/// Measurements, correction form and fit options shared by all commands.
#[derive(Args)]
struct SetupArgs {
    /// Balance variable (PtBal or MPF, case-insensitive)
    #[arg(short, long, default_value = "PtBal")]
    balance: String,

    /// Input file of the multijet analysis (JSON)
    #[arg(long)]
    multijet: Option<PathBuf>,

    /// Input file of the photon+jet analysis (JSON)
    #[arg(long)]
    photonjet: Option<PathBuf>,

    /// Constraint on the correction, "[ptRef,]targetCorr,relUnc"
    #[arg(short, long, allow_hyphen_values = true)]
    constraint: Option<String>,

    /// Functional form of the correction (2p or spline)
    #[arg(long, default_value = "2p")]
    corr: String,

    /// Systematic source of the multijet input to ignore (repeatable)
    #[arg(long)]
    exclude_syst: Vec<String>,

    /// Lower edge of the leading-jet pt range of the multijet input
    #[arg(long, default_value = "0")]
    pt_lead_min: f64,

    /// Upper edge of the leading-jet pt range of the multijet input
    #[arg(long, default_value = "1600")]
    pt_lead_max: f64,

    /// Photon energy scale uncertainty per unit of its nuisance parameter
    #[arg(long, default_value = "0.01")]
    photon_scale_unc: f64,

    /// Bound on the absolute value of every correction parameter
    #[arg(long, default_value = "1")]
    poi_limit: f64,

    /// Bound on the absolute value of every nuisance parameter
    #[arg(long, default_value = "5")]
    nuisance_limit: f64,

    /// Maximum number of minimizer iterations
    #[arg(long, default_value = "1000")]
    max_iter: u64,
}

impl SetupArgs {
    fn fit_config(&self) -> FitConfig {
        let mut config = FitConfig {
            poi_limit: self.poi_limit,
            nuisance_limit: self.nuisance_limit,
            ..Default::default()
        };
        config.optimizer.max_iter = self.max_iter;
        config
    }
}

/// Measurements of one run. They are owned here and borrowed by the loss
/// function.
struct Setup {
    method: Method,
    correction: Box<dyn CorrectionFunction>,
    registry: NuisanceRegistry,
    measurements: Vec<Box<dyn Measurement>>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt().with_max_level(cli.log_level).with_target(false).init();

    match cli.command {
        Commands::Fit { setup, output, json, period } => {
            cmd_fit(&setup, &output, json.as_ref(), &period)
        }
        Commands::Profile { setup, poi, output } => cmd_profile(&setup, &poi, output.as_ref()),
        Commands::Version => {
            println!("jecfit {}", jf_core::VERSION);
            Ok(())
        }
    }
}

fn load_setup(args: &SetupArgs) -> Result<Setup> {
    let method: Method = args.balance.parse()?;
    let correction = create_correction(&args.corr)?;
    let mut registry = NuisanceRegistry::new();
    let mut measurements: Vec<Box<dyn Measurement>> = Vec::new();

    if let Some(path) = &args.photonjet {
        let config = PhotonJetConfig { method, photon_scale_unc: args.photon_scale_unc };
        let pj = PhotonJet::load(path, &config, &mut registry)?;
        tracing::info!(path = %path.display(), points = pj.dimension(), "photon+jet loaded");
        measurements.push(Box::new(pj));
    }

    if let Some(path) = &args.multijet {
        let config = MultijetConfig {
            method,
            pt_lead_range: (args.pt_lead_min, args.pt_lead_max),
            excluded_systematics: args.exclude_syst.iter().cloned().collect(),
        };
        let mj = MultijetBalance::load(path, &config, &mut registry)?;
        tracing::info!(
            path = %path.display(),
            bins = mj.dimension(),
            systematics = mj.systematic_names().len(),
            "multijet loaded"
        );
        measurements.push(Box::new(mj));
    }

    if let Some(text) = &args.constraint {
        let constraint = CorrectionConstraint::from_spec(text)?;
        tracing::info!(
            pt_ref = constraint.pt_ref(),
            target = constraint.target(),
            rel_unc = constraint.rel_unc(),
            "constraint added"
        );
        measurements.push(Box::new(constraint));
    }

    if measurements.is_empty() {
        return Err(jf_core::Error::Config("No measurements requested".into()).into());
    }

    Ok(Setup { method, correction, registry, measurements })
}

fn assemble<'m>(
    measurements: &'m [Box<dyn Measurement>],
    correction: Box<dyn CorrectionFunction>,
    registry: NuisanceRegistry,
) -> Result<CombinedLossFunction<'m>> {
    let mut loss = CombinedLossFunction::new(correction, registry);
    for m in measurements {
        loss.add_measurement(m.as_ref())?;
    }
    tracing::info!(
        parameters = loss.n_params(),
        measurements = loss.measurement_count(),
        ndf = loss.ndf(),
        "loss function ready"
    );
    Ok(loss)
}

fn cmd_fit(args: &SetupArgs, output: &Path, json: Option<&PathBuf>, period: &str) -> Result<()> {
    let Setup { method, correction, registry, measurements } = load_setup(args)?;
    let loss = assemble(&measurements, correction, registry)?;

    let result = Fitter::new(args.fit_config()).fit(&loss)?;
    tracing::info!(
        chi2 = result.chi2,
        ndf = result.ndf,
        converged = result.converged,
        "fit complete"
    );

    print!("{}", report::summary(&result));

    report::write_text(output, &result)?;
    tracing::info!(path = %output.display(), "results written");

    if let Some(path) = json {
        let run = report::RunInfo {
            period: period.to_string(),
            variant: method.label().to_string(),
            corr_form: args.corr.clone(),
            constraint: args.constraint.clone(),
        };
        write_json(Some(path), report::to_json(&result, &run)?)?;
        tracing::info!(path = %path.display(), "JSON summary written");
    }

    println!("\nResults saved to file \"{}\".", output.display());
    Ok(())
}

fn cmd_profile(args: &SetupArgs, poi: &[f64], output: Option<&PathBuf>) -> Result<()> {
    let Setup { correction, registry, measurements, .. } = load_setup(args)?;
    let loss = assemble(&measurements, correction, registry)?;

    let profile = Fitter::new(args.fit_config()).profile(&loss, poi)?;
    tracing::info!(chi2 = profile.chi2, converged = profile.converged, "profile complete");

    let nuisances: serde_json::Map<String, serde_json::Value> = loss
        .registry()
        .names()
        .iter()
        .cloned()
        .zip(profile.nuisances.iter().map(|&v| serde_json::Value::from(v)))
        .collect();

    let output_json = serde_json::json!({
        "poi_names": loss.correction().parameter_names(),
        "poi": profile.poi,
        "chi2": profile.chi2,
        "ndf": loss.ndf(),
        "nuisances": nuisances,
        "converged": profile.converged,
    });

    write_json(output, output_json)
}

fn write_json(output: Option<&PathBuf>, value: serde_json::Value) -> Result<()> {
    if let Some(path) = output {
        std::fs::write(path, serde_json::to_string_pretty(&value)?)?;
    } else {
        println!("{}", serde_json::to_string_pretty(&value)?);
    }
    Ok(())
}
