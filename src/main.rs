use clap::{Arg, ArgAction, Command};
use log::LevelFilter;
use phish_detect::config::toml_config::{generate_default_config, load_config};
use phish_detect::config::Config;
use phish_detect::features::LinkAnalyzer;
use phish_detect::{EmailAnalysis, Metrics, PhishingDetector, UrlReport};
use std::fs;
use std::path::Path;
use std::process;

fn main() {
    let matches = Command::new("phish-detect")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Phishing email classifier with MIME normalization and link heuristics")
        .arg_required_else_help(true)
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path (TOML, or YAML by extension)")
                .default_value("phish-detect.toml"),
        )
        .arg(
            Arg::new("generate-config")
                .long("generate-config")
                .value_name("FILE")
                .help("Write a default configuration file and exit")
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("train")
                .long("train")
                .value_name("CSV")
                .help("Train on a CSV with `content` and `is_phishing` columns, then save the model")
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("test-fraction")
                .long("test-fraction")
                .value_name("FRACTION")
                .help("Share of the dataset held out for evaluation")
                .value_parser(clap::value_parser!(f64))
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("seed")
                .long("seed")
                .value_name("N")
                .help("Seed for the train/test split and the forest")
                .value_parser(clap::value_parser!(u64))
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("test-email")
                .long("test-email")
                .value_name("FILE")
                .help("Classify a raw email file")
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("analyze-urls")
                .long("analyze-urls")
                .value_name("FILE")
                .help("Run the link heuristics over an HTML file")
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("model-info")
                .long("model-info")
                .help("Show the state of the saved model")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("json")
                .long("json")
                .help("Print results as JSON")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Enable debug logging")
                .action(ArgAction::SetTrue),
        )
        .get_matches();

    if let Some(generate_path) = matches.get_one::<String>("generate-config") {
        match generate_default_config(generate_path) {
            Ok(()) => println!("Default configuration written to: {generate_path}"),
            Err(e) => {
                eprintln!("Error writing configuration file: {e:#}");
                process::exit(1);
            }
        }
        return;
    }

    let config_path = matches
        .get_one::<String>("config")
        .map(String::as_str)
        .unwrap_or("phish-detect.toml");
    let config_found = Path::new(config_path).exists();
    let config = if config_found {
        match load_config(config_path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Error loading configuration: {e:#}");
                process::exit(1);
            }
        }
    } else {
        Config::default()
    };

    let log_level = if matches.get_flag("verbose") {
        LevelFilter::Debug
    } else {
        config.log_level()
    };

    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .init();

    if !config_found {
        log::warn!("Configuration file '{config_path}' not found, using default configuration");
    }

    let json = matches.get_flag("json");

    if let Some(html_file) = matches.get_one::<String>("analyze-urls") {
        let html = read_file(html_file);
        let report = LinkAnalyzer::from_config(&config.url_heuristics).analyze_html(&html);
        if json {
            print_json(&report);
        } else {
            print_url_report(&report);
        }
        return;
    }

    let detector = PhishingDetector::from_config(&config);

    if let Some(csv_path) = matches.get_one::<String>("train") {
        let test_fraction = matches
            .get_one::<f64>("test-fraction")
            .copied()
            .unwrap_or(config.training.test_fraction);
        let seed = matches
            .get_one::<u64>("seed")
            .copied()
            .unwrap_or(config.training.seed);

        match detector.train_from_csv(csv_path, test_fraction, seed) {
            Ok(metrics) => {
                if json {
                    print_json(&metrics);
                } else {
                    print_metrics(&metrics, &config);
                }
            }
            Err(e) => {
                eprintln!("❌ Training failed: {e}");
                process::exit(1);
            }
        }
    }

    if let Some(email_file) = matches.get_one::<String>("test-email") {
        let raw = read_file(email_file);
        match detector.analyze(&raw) {
            Ok(analysis) => {
                if json {
                    print_json(&analysis);
                } else {
                    print_analysis(email_file, &analysis);
                }
            }
            Err(e) => {
                eprintln!("❌ Could not classify {email_file}: {e}");
                process::exit(1);
            }
        }
    }

    if matches.get_flag("model-info") {
        let info = detector.engine().model_info();
        if json {
            print_json(&info);
            return;
        }

        println!("🧠 Model");
        println!("  Loaded:        {}", info.model_loaded);
        println!("  Type:          {}", info.model_type);
        println!("  Features:      {}", info.feature_count);
        println!("  Trees:         {}", info.tree_count);
        match info.last_trained {
            Some(ts) => println!("  Last trained:  {ts} (unix time)"),
            None => println!("  Last trained:  never"),
        }

        let top = detector.engine().top_features(10);
        if !top.is_empty() {
            println!();
            println!("  Most important terms:");
            for (term, weight) in top {
                println!("    {term:<20} {weight:.4}");
            }
        }
    }
}

fn read_file(path: &str) -> String {
    match fs::read(path) {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(e) => {
            eprintln!("❌ Error reading {path}: {e}");
            process::exit(1);
        }
    }
}

fn print_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{json}"),
        Err(e) => {
            eprintln!("❌ Failed to serialize output: {e}");
            process::exit(1);
        }
    }
}

fn print_metrics(metrics: &Metrics, config: &Config) {
    println!("✅ Model trained and saved to {}", config.model.model_path);
    println!();
    println!("  Train size:  {}", metrics.train_size);
    println!("  Test size:   {}", metrics.test_size);
    println!("  Features:    {}", metrics.feature_count);
    println!("  Accuracy:    {:.4}", metrics.accuracy);
    println!("  Precision:   {:.4}", metrics.precision);
    println!("  Recall:      {:.4}", metrics.recall);
    println!("  F1 score:    {:.4}", metrics.f1_score);
    println!();
    println!("{}", metrics.classification_report);
}

fn print_analysis(email_file: &str, analysis: &EmailAnalysis) {
    let verdict = if analysis.prediction.label.is_phishing() {
        "🎣 PHISHING"
    } else {
        "✅ LEGITIMATE"
    };

    println!("🧪 {email_file}");
    println!("  Verdict:     {verdict}");
    println!("  Confidence:  {:.2}", analysis.prediction.confidence);
    println!("  {}", analysis.prediction.explanation);
    println!();
    print_url_report(&analysis.urls);
}

fn print_url_report(report: &UrlReport) {
    println!(
        "🔗 Links: {} total, {} suspicious",
        report.total_urls, report.suspicious_count
    );
    for finding in &report.findings {
        let reasons: Vec<&str> = finding.reasons.iter().map(|r| r.describe()).collect();
        println!("  • {} ({})", finding.url, reasons.join(", "));
    }
}
