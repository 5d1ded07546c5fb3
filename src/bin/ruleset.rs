//! ruleset: CLI tool for compiling, inspecting and fetching rule-set files.

use clap::{Parser, Subcommand, ValueEnum};
use ruleset_provider::binary::BinaryRuleWriter;
use ruleset_provider::http::{HttpClient, UreqClient, STATUS_OK};
use ruleset_provider::outbound::{DirectDialer, ProxyDialer};
use ruleset_provider::{IpSet, RuleSetFormat, SourceParser, SourceWriter};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "ruleset")]
#[command(version)]
#[command(about = "Compile, inspect and fetch routing rule-sets", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum FormatArg {
    Source,
    Binary,
}

impl From<FormatArg> for RuleSetFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Source => RuleSetFormat::Source,
            FormatArg::Binary => RuleSetFormat::Binary,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a source (JSON) rule-set to binary
    Compile {
        /// Input source file
        #[arg(short, long)]
        input: PathBuf,

        /// Output file, defaults to the input with an .srs extension
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Decompile a binary rule-set to source (JSON)
    Decompile {
        /// Input binary file
        #[arg(short, long)]
        input: PathBuf,

        /// Output file, defaults to the input with a .json extension
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print rule count and extracted IP ranges
    Inspect {
        /// Rule-set file
        #[arg(short, long)]
        input: PathBuf,

        /// File format, inferred from the extension when omitted
        #[arg(short, long, value_enum)]
        format: Option<FormatArg>,

        /// Print every extracted IP range
        #[arg(short, long)]
        verbose: bool,
    },

    /// Download a rule-set once and validate it
    Fetch {
        /// Rule-set URL
        #[arg(short, long)]
        url: String,

        /// Output file
        #[arg(short, long)]
        output: PathBuf,

        /// File format, inferred from the URL when omitted
        #[arg(short, long, value_enum)]
        format: Option<FormatArg>,

        /// Upstream proxy URL (http:// or socks5://)
        #[arg(short, long)]
        proxy: Option<String>,
    },
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Compile { input, output } => compile(&input, output),
        Commands::Decompile { input, output } => decompile(&input, output),
        Commands::Inspect {
            input,
            format,
            verbose,
        } => inspect(&input, format.map(Into::into), verbose),
        Commands::Fetch {
            url,
            output,
            format,
            proxy,
        } => fetch(&url, &output, format.map(Into::into), proxy),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn resolve_format(
    explicit: Option<RuleSetFormat>,
    location: &str,
) -> Result<RuleSetFormat, Box<dyn std::error::Error>> {
    explicit
        .or_else(|| RuleSetFormat::from_path(location))
        .ok_or_else(|| format!("cannot infer format of {}, pass --format", location).into())
}

fn compile(input: &Path, output: Option<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    let rules = SourceParser::parse(&fs::read(input)?)?;
    let data = BinaryRuleWriter::new().write(&rules)?;

    let output = output.unwrap_or_else(|| input.with_extension("srs"));
    fs::write(&output, &data)?;

    println!(
        "Compiled {} rules: {:?} -> {:?} ({} bytes)",
        rules.len(),
        input,
        output,
        data.len()
    );
    Ok(())
}

fn decompile(input: &Path, output: Option<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    let rules = RuleSetFormat::Binary.decode(&fs::read(input)?)?;
    let data = SourceWriter::write(&rules)?;

    let output = output.unwrap_or_else(|| input.with_extension("json"));
    fs::write(&output, &data)?;

    println!("Decompiled {} rules: {:?} -> {:?}", rules.len(), input, output);
    Ok(())
}

fn inspect(
    input: &Path,
    format: Option<RuleSetFormat>,
    verbose: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let format = resolve_format(format, &input.to_string_lossy())?;
    let rules = format.decode(&fs::read(input)?)?;
    let ips = IpSet::from_rules(&rules);

    println!("File:     {:?}", input);
    println!("Format:   {}", format);
    println!("Rules:    {}", rules.len());
    println!("IP ranges: {}", ips.len());

    if verbose {
        for net in ips.iter() {
            println!("  {}", net);
        }
    }
    Ok(())
}

fn fetch(
    url: &str,
    output: &Path,
    format: Option<RuleSetFormat>,
    proxy: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let format = resolve_format(format, url)?;
    let client = match proxy {
        Some(proxy) => UreqClient::new(&ProxyDialer::new("proxy", proxy))?,
        None => UreqClient::new(&DirectDialer::default())?,
    };

    log::info!("Downloading {}", url);
    let response = client.get(url, None)?;
    if response.status != STATUS_OK {
        return Err(format!("unexpected status: {}", response.status).into());
    }

    let rules = format.decode(&response.body)?;
    if let Some(parent) = output.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    fs::write(output, &response.body)?;

    println!(
        "Fetched {} rules -> {:?} ({} bytes{})",
        rules.len(),
        output,
        response.body.len(),
        response
            .etag
            .map(|etag| format!(", etag {}", etag))
            .unwrap_or_default()
    );
    Ok(())
}
