use dotenv::dotenv;
use statement_reconciler::llm::GeminiClient;
use statement_reconciler::{
    CompanyPipeline, CompanyProfile, DocumentStore, EngineConfig, ReportLoader, StatementType,
    WorkbookStore,
};
use std::error::Error;
use std::path::{Path, PathBuf};

/// Usage: extract_company <company name> <reports dir> [output dir] [engine config json]
///
/// Reports are annual-report PDFs or plain-text exports with one page per
/// form feed, named with their fiscal year (e.g. `ericsson_2023.pdf`).
#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenv().ok();
    env_logger::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.len() < 2 {
        eprintln!("usage: extract_company <company name> <reports dir> [output dir] [config.json]");
        std::process::exit(2);
    }

    let api_key = std::env::var("GEMINI_API_KEY").expect("GEMINI_API_KEY must be set");
    let company = CompanyProfile::new(args[0].clone());
    let reports_dir = Path::new(&args[1]);
    let output_dir = args.get(2).map(PathBuf::from).unwrap_or_else(|| PathBuf::from("output"));
    let config = match args.get(3) {
        Some(path) => EngineConfig::from_json_file(Path::new(path))?,
        None => EngineConfig::default(),
    };

    println!("🚀 Extracting statements for {}\n", company.name);

    let store = DocumentStore::scan_dir(reports_dir)?;
    if store.is_empty() {
        println!("⚠️  No dated reports found in {:?}.", reports_dir);
        return Ok(());
    }
    println!("📄 Reports: {:?}", store.years());

    let client = GeminiClient::new(api_key).with_model(config.model.clone());
    let loader = ReportLoader {
        min_table_rows: config.min_table_rows,
    };
    let pipeline = CompanyPipeline::new(config, client, loader)?;

    let output = WorkbookStore::new(output_dir);
    let prior = output.load(&company.name)?;
    if prior.is_some() {
        println!("📚 Merging into prior output");
    }

    let (workbook, report) = pipeline.run(&company, &store, prior).await;
    let path = output.save(&workbook)?;

    println!("\n✅ Saved {}", path.display());
    for statement in StatementType::ALL {
        let rows = workbook.statement(statement).map_or(0, |t| t.len());
        println!("   {:<22} {} line items", statement.to_string(), rows);
    }

    let totals = report.totals();
    println!(
        "\n📊 {} pages matched, {} parsed, {} failed",
        totals.pages_matched, totals.pages_parsed, totals.pages_failed
    );
    for (year, reason) in &report.failed_documents {
        println!("   ⚠️  {}: {}", year, reason);
    }

    Ok(())
}
