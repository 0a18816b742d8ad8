use std::{
    env, fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Error};
use calamine::{open_workbook, Reader, Xlsx};
use tracing::info;
use tracing_subscriber::EnvFilter;

use in1888::{generate_report, pick_sheet, rows_from_range, ReportError, ReportTables};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("in1888=info".parse()?))
        .init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 || args.len() > 4 {
        return Err(Error::msg(
            "Usage: ./in1888 \"path/to/file.xlsx\" [sheet] [output-dir]",
        ));
    }
    let input = Path::new(&args[1]);
    let hint = args.get(2).map(|s| s.trim()).filter(|s| !s.is_empty());

    let mut workbook: Xlsx<_> = open_workbook(input)
        .with_context(|| format!("failed to open {}", input.display()))?;
    let names = workbook.sheet_names().to_owned();
    let sheet = pick_sheet(&names, hint)?.to_string();
    let range = workbook
        .worksheet_range(&sheet)
        .map_err(|_| ReportError::SheetNotFound(sheet.clone()))?;
    let rows = rows_from_range(&range);
    info!(sheet = %sheet, rows = rows.len(), "processing worksheet");

    let report = generate_report(&rows, &sheet, &ReportTables::default());
    let summary = report.summary();

    let out_dir = match args.get(3) {
        Some(dir) => PathBuf::from(dir),
        None => match input.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        },
    };
    fs::create_dir_all(&out_dir)
        .with_context(|| format!("failed to create output directory {}", out_dir.display()))?;
    fs::write(out_dir.join("IN1888_0110_COMPRA.txt"), report.purchases_text())?;
    fs::write(out_dir.join("IN1888_0120_VENDA.txt"), report.sales_text())?;
    fs::write(
        out_dir.join("IN1888_meta.json"),
        serde_json::to_vec_pretty(&summary)?,
    )?;

    println!("Sheet processed: {}", summary.sheet_name);
    println!("0110 (COMPRA) records: {}", summary.count_0110);
    println!("0120 (VENDA) records: {}", summary.count_0120);
    println!("Ignored rows: {}", summary.ignored);
    println!("Reports written to {}", out_dir.display());

    Ok(())
}
