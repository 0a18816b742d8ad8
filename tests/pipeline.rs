use in1888::{generate_report, Cell, ReportTables, Row};

fn text(s: &str) -> Cell {
    Cell::Text(s.to_string())
}

fn sample_rows() -> Vec<Row> {
    vec![
        Row::new(vec![
            ("DATA".to_string(), text("01/02/2023")),
            ("TIPO".to_string(), text("COMPRA")),
            ("QUANTIDADE".to_string(), Cell::Number(1.5)),
            ("VALOR TOTAL".to_string(), Cell::Number(100.0)),
            ("TAXA FIXA".to_string(), Cell::Number(2.0)),
        ]),
        Row::new(vec![
            ("DATA".to_string(), text("2023-03-10")),
            ("TIPO".to_string(), text("venda")),
            ("QUANTIDADE".to_string(), text("2.25")),
            ("VALOR TOTAL".to_string(), text("50,00")),
        ]),
    ]
}

#[test]
fn generates_both_report_texts() {
    let report = generate_report(&sample_rows(), "Movimentos 2023", &ReportTables::default());

    assert_eq!(report.ignored, 0);
    assert_eq!(
        report.purchases_text(),
        "0110|01022023|I|100,00|2,00|USDT|1,5000000000|BINANCE|https://www.binance.com/|KY\r\n"
    );
    assert_eq!(
        report.sales_text(),
        "0120|10032023|I|50,00|0,00|USDT|2,2500000000|BINANCE|https://www.binance.com/|KY\r\n"
    );
}

#[test]
fn summary_serializes_with_regulatory_field_names() {
    let report = generate_report(&sample_rows(), "Movimentos 2023", &ReportTables::default());
    let json = serde_json::to_value(report.summary()).unwrap();

    assert_eq!(json["sheet_name"], "Movimentos 2023");
    assert_eq!(json["ignored"], 0);
    assert_eq!(json["count_0110"], 1);
    assert_eq!(json["count_0120"], 1);
}

#[test]
fn skipped_rows_only_affect_the_counter() {
    let mut rows = sample_rows();
    rows.insert(
        1,
        Row::new(vec![
            ("DATA".to_string(), text("05/02/2023")),
            ("TIPO".to_string(), text("TRANSFERENCIA")),
        ]),
    );
    let report = generate_report(&rows, "Movimentos 2023", &ReportTables::default());

    assert_eq!(report.ignored, 1);
    assert_eq!(report.purchases.len(), 1);
    assert_eq!(report.sales.len(), 1);
}
