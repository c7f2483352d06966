use futures::future::BoxFuture;
use serde_json::json;
use statement_reconciler::*;
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tempfile::tempdir;

type Responder = Box<dyn Fn(&ExtractionPrompt) -> Result<String> + Send + Sync>;

/// Answers prompts from a closure and records every prompt it saw.
struct ScriptedModel {
    respond: Responder,
    prompts: Mutex<Vec<ExtractionPrompt>>,
}

impl ScriptedModel {
    fn new(respond: impl Fn(&ExtractionPrompt) -> Result<String> + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            respond: Box::new(respond),
            prompts: Mutex::new(Vec::new()),
        })
    }

    fn prompts(&self) -> Vec<ExtractionPrompt> {
        self.prompts.lock().unwrap().clone()
    }
}

impl ModelService for ScriptedModel {
    fn complete<'a>(&'a self, prompt: &'a ExtractionPrompt) -> BoxFuture<'a, Result<ModelResponse>> {
        Box::pin(async move {
            self.prompts.lock().unwrap().push(prompt.clone());
            (self.respond)(prompt).map(ModelResponse::from)
        })
    }
}

fn pipeline(
    config: EngineConfig,
    model: &Arc<ScriptedModel>,
) -> CompanyPipeline<Arc<ScriptedModel>, TextDocumentLoader> {
    let loader = TextDocumentLoader {
        min_table_rows: config.min_table_rows,
    };
    CompanyPipeline::new(config, model.clone(), loader).unwrap()
}

fn rows_json(items: &[(&str, &str)]) -> String {
    let rows: Vec<_> = items
        .iter()
        .map(|(item, value)| json!({"Line Item": item, "Value(s)": value}))
        .collect();
    serde_json::Value::Array(rows).to_string()
}

fn table_page(page_number: usize, text: &str) -> Page {
    Page {
        page_number,
        text: text.to_string(),
        has_table: true,
    }
}

fn text(value: &str) -> CellValue {
    CellValue::Text(value.to_string())
}

const COVER: &str = "Acme Group\nAnnual Report 2023\n";

const CONTENTS: &str = "Contents\n\
    Letter from the CEO ............ 4\n\
    Income statement ............... 3\n\
    Balance sheet .................. 5\n";

const INCOME_2023: &str = "Consolidated income statement\n\
    SEK million            2023      2022\n\
    Revenue               1,000       900\n\
    Cost of sales          (600)     (550)\n\
    Operating income         400       350\n";

fn write_report(dir: &Path, name: &str, pages: &[&str]) {
    fs::write(dir.join(name), pages.join("\x0c")).unwrap();
}

#[tokio::test]
async fn test_end_to_end_merges_into_prior_output() {
    let dir = tempdir().unwrap();
    write_report(dir.path(), "acme_2023.txt", &[COVER, CONTENTS, INCOME_2023]);

    let model = ScriptedModel::new(|prompt| {
        assert!(prompt.user.contains("Cost of sales"));
        Ok(r#"[{"Line Item":"Revenue","Value(s)":"1000"}]"#.to_string())
    });
    let pipeline = pipeline(EngineConfig::default(), &model);

    let prior_income = StatementTable::from_rows(
        &["Line Item".to_string(), "2022".to_string()],
        &[vec!["Revenue".to_string(), "900".to_string()]],
    )
    .unwrap();
    let mut prior = CompanyWorkbook::new("Acme");
    prior.insert_statement(StatementType::Income, prior_income);

    let store = DocumentStore::scan_dir(dir.path()).unwrap();
    let (workbook, report) = pipeline
        .run(&CompanyProfile::new("Acme"), &store, Some(prior))
        .await;

    let income = workbook.statement(StatementType::Income).unwrap();
    assert_eq!(
        income.to_json_value(),
        json!({"Revenue": {"2022": "900", "2023": "1000"}})
    );
    assert_eq!(income.line_items().next(), Some("Revenue"));

    let prompts = model.prompts();
    assert_eq!(prompts.len(), 1);
    assert_eq!(prompts[0].statement, StatementType::Income);
    assert_eq!(prompts[0].year, "2023");

    let stats = report.stats(2023, StatementType::Income).unwrap();
    assert_eq!(stats.pages_matched, 1);
    assert_eq!(stats.pages_parsed, 1);
    assert_eq!(report.stats(2023, StatementType::Balance).unwrap().pages_matched, 0);
}

#[tokio::test]
async fn test_synonyms_collapse_into_one_row() {
    let model = ScriptedModel::new(|prompt| {
        if prompt.user.contains("PAGE-ONE") {
            Ok(rows_json(&[("Net Revenue", "500")]))
        } else {
            Ok(rows_json(&[("Total Revenue", "500")]))
        }
    });
    let pipeline = pipeline(EngineConfig::default(), &model);
    let document = vec![
        table_page(1, "Income statement PAGE-ONE"),
        table_page(2, "Income statement (continued)"),
    ];

    let mut workbook = CompanyWorkbook::new("Acme");
    let mut report = RunReport::new("Acme");
    pipeline
        .process_document(&mut workbook, 2023, &document, &mut report)
        .await;

    let income = workbook.statement(StatementType::Income).unwrap();
    assert_eq!(income.line_items().collect::<Vec<_>>(), vec!["total revenue"]);
    assert_eq!(income.value("total revenue", "2023"), Some(&text("500")));
}

#[tokio::test]
async fn test_unparsable_page_does_not_block_others() {
    let model = ScriptedModel::new(|prompt| {
        if prompt.user.contains("BROKEN") {
            Ok("Sorry, here is the table: [{'Line Item': 'Goodwill', 'Value(s)': ".to_string())
        } else if prompt.user.contains("FIRST") {
            Ok(rows_json(&[("Cash", "10")]))
        } else {
            Ok(format!("```json\n{}\n```", rows_json(&[("Goodwill", "7")])))
        }
    });
    let pipeline = pipeline(EngineConfig::default(), &model);
    let document = vec![
        table_page(1, "Balance sheet FIRST"),
        table_page(2, "Balance sheet BROKEN"),
        table_page(3, "Balance sheet"),
    ];

    let mut workbook = CompanyWorkbook::new("Acme");
    let mut report = RunReport::new("Acme");
    pipeline
        .process_document(&mut workbook, 2023, &document, &mut report)
        .await;

    let balance = workbook.statement(StatementType::Balance).unwrap();
    assert_eq!(balance.line_items().collect::<Vec<_>>(), vec!["Cash", "Goodwill"]);
    assert_eq!(balance.value("Goodwill", "2023"), Some(&text("7")));

    let stats = report.stats(2023, StatementType::Balance).unwrap();
    assert_eq!(stats.pages_matched, 3);
    assert_eq!(stats.pages_parsed, 2);
    assert_eq!(stats.pages_failed, 1);
}

#[tokio::test]
async fn test_model_failure_drops_only_that_page() {
    let model = ScriptedModel::new(|prompt| {
        if prompt.user.contains("TIMEOUT") {
            Err(ReconcileError::ModelService("deadline exceeded".to_string()))
        } else {
            Ok(rows_json(&[("Operating cash flow", "55")]))
        }
    });
    let pipeline = pipeline(EngineConfig::default(), &model);
    let document = vec![
        table_page(1, "Cash flow statement TIMEOUT"),
        table_page(2, "Statement of cash flows"),
    ];

    let mut workbook = CompanyWorkbook::new("Acme");
    let mut report = RunReport::new("Acme");
    pipeline
        .process_document(&mut workbook, 2022, &document, &mut report)
        .await;

    let cash_flow = workbook.statement(StatementType::CashFlow).unwrap();
    assert_eq!(cash_flow.value("operating cash flow", "2022"), Some(&text("55")));
    assert_eq!(report.stats(2022, StatementType::CashFlow).unwrap().pages_failed, 1);
}

#[tokio::test]
async fn test_last_page_wins_within_a_document() {
    let model = ScriptedModel::new(|prompt| {
        if prompt.user.contains("EARLY") {
            Ok(rows_json(&[("Inventories", "10"), ("Receivables", "4")]))
        } else {
            Ok(rows_json(&[("Inventories", "12")]))
        }
    });
    let pipeline = pipeline(EngineConfig::default(), &model);
    let document = vec![
        table_page(1, "Balance sheet EARLY"),
        table_page(2, "Balance sheet restated"),
    ];

    let mut workbook = CompanyWorkbook::new("Acme");
    let mut report = RunReport::new("Acme");
    pipeline
        .process_document(&mut workbook, 2023, &document, &mut report)
        .await;

    let balance = workbook.statement(StatementType::Balance).unwrap();
    assert_eq!(balance.value("Inventories", "2023"), Some(&text("12")));
    assert_eq!(balance.value("Receivables", "2023"), Some(&text("4")));
    assert_eq!(balance.len(), 2);
}

#[tokio::test]
async fn test_year_merge_keeps_row_order() {
    let dir = tempdir().unwrap();
    let balance_2023 = "Balance sheet\nSEK m 2023 2022\nCash 5 1\nInventories 6 2\nLeases 7 3\nYEAR-2023\n";
    let balance_2022 = "Balance sheet\nSEK m 2022 2021\nCash 1 0\nInventories 2 0\nGoodwill 3 0\nYEAR-2022\n";
    write_report(dir.path(), "acme_2022.txt", &[COVER, balance_2022]);
    write_report(dir.path(), "acme_2023.txt", &[COVER, balance_2023]);

    let model = ScriptedModel::new(|prompt| {
        if prompt.user.contains("YEAR-2023") {
            Ok(rows_json(&[("Cash", "5"), ("Inventories", "6")]))
        } else {
            Ok(rows_json(&[("Inventories", "2"), ("Goodwill", "3"), ("Cash", "1")]))
        }
    });
    let pipeline = pipeline(EngineConfig::default(), &model);
    let store = DocumentStore::scan_dir(dir.path()).unwrap();
    let (workbook, _) = pipeline.run(&CompanyProfile::new("Acme"), &store, None).await;

    let years: Vec<String> = model.prompts().iter().map(|p| p.year.clone()).collect();
    assert_eq!(years, vec!["2023", "2022"]);

    let balance = workbook.statement(StatementType::Balance).unwrap();
    assert_eq!(
        balance.line_items().collect::<Vec<_>>(),
        vec!["Cash", "Inventories", "Goodwill"]
    );
    assert_eq!(balance.periods(), &["2023".to_string(), "2022".to_string()]);
    assert_eq!(balance.value("Goodwill", "2023"), None);
    assert_eq!(balance.value("Cash", "2022"), Some(&text("1")));
}

#[tokio::test]
async fn test_unopenable_document_skips_only_its_year() {
    let dir = tempdir().unwrap();
    write_report(dir.path(), "acme_2022.txt", &[INCOME_2023]);

    let mut store = DocumentStore::scan_dir(dir.path()).unwrap();
    store.insert(2023, dir.path().join("acme_2023.txt"));

    let model = ScriptedModel::new(|_| Ok(rows_json(&[("Revenue", "900")])));
    let pipeline = pipeline(EngineConfig::default(), &model);
    let (workbook, report) = pipeline.run(&CompanyProfile::new("Acme"), &store, None).await;

    assert!(report.failed_documents.contains_key(&2023));
    assert!(!report.failed_documents.contains_key(&2022));
    let income = workbook.statement(StatementType::Income).unwrap();
    assert_eq!(income.value("total revenue", "2022"), Some(&text("900")));
}

#[tokio::test]
async fn test_period_records_style() {
    let model = ScriptedModel::new(|prompt| {
        assert_eq!(prompt.style, PromptStyle::PeriodRecords);
        Ok(r#"[{"item": "EBIT", "value": "7", "period": "2023"},
               {"item": "EBIT", "value": "6", "period": "2022"},
               {"item": "Net income", "value": "4", "period": null}]"#
            .to_string())
    });
    let config = EngineConfig::default().with_prompt_style(PromptStyle::PeriodRecords);
    let pipeline = pipeline(config, &model);
    let document = vec![table_page(1, "Statement of income")];

    let mut workbook = CompanyWorkbook::new("Acme");
    let mut report = RunReport::new("Acme");
    pipeline
        .process_document(&mut workbook, 2023, &document, &mut report)
        .await;

    let income = workbook.statement(StatementType::Income).unwrap();
    assert_eq!(
        income.to_json_value(),
        json!({
            "operating income": {"2023": "7", "2022": "6"},
            "net income": {"2023": "4"}
        })
    );
}

#[tokio::test]
async fn test_batched_mode_sends_every_chunk_for_every_statement() {
    let model = ScriptedModel::new(|prompt| match prompt.statement {
        StatementType::Income if prompt.user.contains("Cost of sales") => {
            Ok(rows_json(&[("Revenue", "1,000")]))
        }
        _ => Ok("[]".to_string()),
    });
    let config = EngineConfig::default().with_batching(ChunkingOptions {
        chunk_size: 120,
        chunk_overlap: 20,
    });
    let pipeline = pipeline(config, &model);
    let document = TextDocument::from_text(&[COVER, CONTENTS, INCOME_2023].join("\x0c"), 3);

    let mut workbook = CompanyWorkbook::new("Acme");
    let mut report = RunReport::new("Acme");
    pipeline
        .process_document(&mut workbook, 2023, &document, &mut report)
        .await;

    let chunks = report.stats(2023, StatementType::Income).unwrap().pages_matched;
    assert!(chunks > 1);
    assert_eq!(model.prompts().len(), chunks * StatementType::ALL.len());
    assert!(workbook.statement(StatementType::Balance).is_none());

    let income = workbook.statement(StatementType::Income).unwrap();
    assert_eq!(income.value("total revenue", "2023"), Some(&text("1,000")));
}

#[tokio::test]
async fn test_saved_output_is_merged_on_next_run() {
    let reports = tempdir().unwrap();
    let out = tempdir().unwrap();
    let output = WorkbookStore::new(out.path());
    let company = CompanyProfile::new("Acme Group");

    write_report(reports.path(), "acme_2022.txt", &[INCOME_2023]);
    let model = ScriptedModel::new(|prompt| {
        if prompt.year == "2022" {
            Ok(rows_json(&[("Revenue", "900"), ("Cost of sales", "(550)")]))
        } else {
            Ok(rows_json(&[("Net sales", "1,000"), ("Other income", "12")]))
        }
    });
    let pipeline = pipeline(EngineConfig::default(), &model);

    let store = DocumentStore::scan_dir(reports.path()).unwrap();
    let (first, _) = pipeline.run(&company, &store, output.load(&company.name).unwrap()).await;
    output.save(&first).unwrap();

    write_report(reports.path(), "acme_2023.txt", &[INCOME_2023]);
    let mut store = DocumentStore::new();
    store.insert(2023, reports.path().join("acme_2023.txt"));
    let prior = output.load(&company.name).unwrap();
    assert!(prior.is_some());
    let (second, _) = pipeline.run(&company, &store, prior).await;

    let income = second.statement(StatementType::Income).unwrap();
    assert_eq!(
        income.line_items().collect::<Vec<_>>(),
        vec!["total revenue", "cost of sales", "Other income"]
    );
    assert_eq!(income.value("total revenue", "2022"), Some(&text("900")));
    assert_eq!(income.value("total revenue", "2023"), Some(&text("1,000")));

    let csv_path = output
        .sheet_dir(&company.name)
        .join(format!("{}.csv", sheet_name(StatementType::Income)));
    let from_csv = StatementTable::read_csv(&csv_path).unwrap();
    assert_eq!(from_csv.value("cost of sales", "2022"), Some(&text("(550)")));
}

#[test]
fn test_config_file_drives_keywords() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("engine.json");
    fs::write(
        &path,
        r#"{"keywords": {"income": ["profit and loss"]}, "min_table_rows": 2}"#,
    )?;

    let config = EngineConfig::from_json_file(&path)?;
    let document = TextDocument::from_pages(
        vec![
            "Income statement\nRevenue 1 2\nCosts 3 4\n".to_string(),
            "Profit and loss account\nRevenue 1 2\nCosts 3 4\n".to_string(),
        ],
        config.min_table_rows,
    );

    let pages = locate_pages(&document, &config.keywords_for(StatementType::Income));
    assert_eq!(pages.iter().map(|(n, _)| *n).collect::<Vec<_>>(), vec![2]);
    Ok(())
}
