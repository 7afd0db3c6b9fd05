use std::borrow::Cow;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

use contaflow_core::{
    normalize, Account, ClassificationResult, KnowledgeBase, Money, TrainingExample, Transaction,
};

const SEPARATORS: [u8; 3] = [b';', b',', b'\t'];
const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

pub const OUTPUT_HEADER: [&str; 9] = [
    "Data",
    "DescricaoOriginal",
    "Valor",
    "Débito",
    "Crédito",
    "GrupoClassificado",
    "SubgrupoClassificado",
    "Metodo",
    "Confianca",
];

#[derive(Error, Debug)]
pub enum CsvError {
    #[error("Cannot read '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Could not split '{0}' into columns with any of the separators ';' ',' or TAB")]
    Undetectable(PathBuf),
    #[error("'{path}' is missing required column '{column}' (found: {found})")]
    MissingColumn {
        path: PathBuf,
        column: String,
        found: String,
    },
    #[error("Cannot write '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}

/// A decoded CSV file with normalized header names.
#[derive(Debug, Clone)]
pub struct Table {
    source: PathBuf,
    headers: Vec<String>,
    rows: Vec<csv::StringRecord>,
}

impl Table {
    pub fn read(path: &Path) -> Result<Self, CsvError> {
        let bytes = std::fs::read(path).map_err(|source| CsvError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_bytes(&bytes, path)
    }

    /// Decodes UTF-8 (with or without BOM), falling back to Latin-1, then
    /// tries each separator until one splits the header into several columns.
    pub fn from_bytes(data: &[u8], source: &Path) -> Result<Self, CsvError> {
        let text = decode(data);

        for separator in SEPARATORS {
            let mut reader = csv::ReaderBuilder::new()
                .has_headers(true)
                .flexible(true)
                .delimiter(separator)
                .from_reader(text.as_bytes());

            let headers = match reader.headers() {
                Ok(h) if h.len() > 1 => h.iter().map(normalize).collect::<Vec<_>>(),
                _ => continue,
            };

            let rows: Result<Vec<_>, _> = reader.records().collect();
            if let Ok(rows) = rows {
                tracing::debug!(
                    source = %source.display(),
                    separator = %(separator as char).escape_default(),
                    columns = headers.len(),
                    rows = rows.len(),
                    "table decoded"
                );
                return Ok(Table {
                    source: source.to_path_buf(),
                    headers,
                    rows,
                });
            }
        }

        Err(CsvError::Undetectable(source.to_path_buf()))
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// First column whose normalized header equals one of `names`, tried in order.
    pub fn column(&self, names: &[&str]) -> Option<usize> {
        names.iter().find_map(|name| {
            self.headers
                .iter()
                .position(|h| !h.is_empty() && h == name)
        })
    }

    fn require(&self, names: &[&str]) -> Result<usize, CsvError> {
        self.column(names).ok_or_else(|| CsvError::MissingColumn {
            path: self.source.clone(),
            column: names[0].to_string(),
            found: self.headers.join(", "),
        })
    }

    fn rows(&self) -> impl Iterator<Item = &csv::StringRecord> {
        self.rows.iter()
    }
}

fn decode(data: &[u8]) -> Cow<'_, str> {
    let data = data.strip_prefix(UTF8_BOM).unwrap_or(data);
    match std::str::from_utf8(data) {
        Ok(s) => Cow::Borrowed(s),
        Err(_) => Cow::Owned(data.iter().map(|&b| b as char).collect()),
    }
}

/// Cell value, with empty cells treated as missing.
fn cell(record: &csv::StringRecord, column: Option<usize>) -> Option<&str> {
    column
        .and_then(|c| record.get(c))
        .filter(|s| !s.is_empty())
}

// ── Chart of accounts ─────────────────────────────────────────────────────────

pub fn read_knowledge_base(path: &Path) -> Result<KnowledgeBase, CsvError> {
    knowledge_base_from_table(&Table::read(path)?)
}

pub fn knowledge_base_from_table(table: &Table) -> Result<KnowledgeBase, CsvError> {
    let code_col = table.require(&["codigo"])?;
    let subgroup_col = table.require(&["subgrupo", "subgrupos"])?;
    let group_col = table.column(&["grupo"]);
    let movement_col = table.column(&["movimentacao"]);

    Ok(table
        .rows()
        .map(|r| Account {
            code: cell(r, Some(code_col)).unwrap_or_default().trim().to_string(),
            group: cell(r, group_col).unwrap_or_default().to_string(),
            subgroup: cell(r, Some(subgroup_col)).unwrap_or_default().to_string(),
            movement: cell(r, movement_col).map(str::to_string),
        })
        .collect())
}

// ── Curated training examples ─────────────────────────────────────────────────

pub fn read_training_examples(path: &Path) -> Result<Vec<TrainingExample>, CsvError> {
    training_examples_from_table(&Table::read(path)?)
}

pub fn training_examples_from_table(table: &Table) -> Result<Vec<TrainingExample>, CsvError> {
    let text_col = table.require(&["descricaoexemplo", "descricao"])?;
    let code_col = table.require(&["codigocorreto", "codigo_correto", "codigo correto"])?;

    Ok(table
        .rows()
        .filter_map(|r| {
            let text = cell(r, Some(text_col))?;
            let code = cell(r, Some(code_col))?.trim();
            (!code.is_empty()).then(|| TrainingExample::new(text, code))
        })
        .collect())
}

// ── Transactions ──────────────────────────────────────────────────────────────

pub fn read_transactions(path: &Path) -> Result<Vec<Transaction>, CsvError> {
    transactions_from_table(&Table::read(path)?)
}

pub fn transactions_from_table(table: &Table) -> Result<Vec<Transaction>, CsvError> {
    let description_col = table.require(&["descricao", "historico"])?;
    let amount_col = table.require(&["valor"])?;
    let date_col = table.column(&["data"]);
    let group_col = table.column(&["grupo", "categoria"]);
    let subgroup_col = table.column(&["subgrupo", "subcategoria"]);

    Ok(table
        .rows()
        .enumerate()
        .map(|(line, r)| Transaction {
            date: cell(r, date_col).unwrap_or_default().to_string(),
            description: cell(r, Some(description_col)).map(str::to_string),
            group: cell(r, group_col).map(str::to_string),
            subgroup: cell(r, subgroup_col).map(str::to_string),
            amount: parse_amount(cell(r, Some(amount_col)), line + 2, &table.source),
        })
        .collect())
}

fn parse_amount(raw: Option<&str>, line: usize, source: &Path) -> Money {
    let Some(raw) = raw else {
        return Money::zero();
    };
    Money::parse(raw).unwrap_or_else(|e| {
        tracing::warn!(source = %source.display(), line, "{e}; using 0");
        Money::zero()
    })
}

// ── Output ────────────────────────────────────────────────────────────────────

/// Results written next to their destination and renamed into place on
/// `commit`. Dropping an uncommitted output removes the temporary file.
#[derive(Debug)]
pub struct StagedOutput {
    temp: PathBuf,
    target: PathBuf,
    committed: bool,
}

impl StagedOutput {
    pub fn target(&self) -> &Path {
        &self.target
    }

    pub fn commit(mut self) -> Result<(), CsvError> {
        std::fs::rename(&self.temp, &self.target).map_err(|e| CsvError::Write {
            path: self.target.clone(),
            source: e.into(),
        })?;
        self.committed = true;
        Ok(())
    }
}

impl Drop for StagedOutput {
    fn drop(&mut self) {
        if !self.committed {
            let _ = std::fs::remove_file(&self.temp);
        }
    }
}

pub fn stage_results(
    path: &Path,
    results: &[ClassificationResult],
) -> Result<StagedOutput, CsvError> {
    let to_write_error = |source: csv::Error| CsvError::Write {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| to_write_error(e.into()))?;
    }
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let staged = StagedOutput {
        temp: path.with_file_name(format!(".{file_name}.tmp")),
        target: path.to_path_buf(),
        committed: false,
    };

    let file = std::fs::File::create(&staged.temp).map_err(|e| to_write_error(e.into()))?;
    let mut writer = std::io::BufWriter::new(file);
    write_results_to(&mut writer, results).map_err(to_write_error)?;
    writer
        .into_inner()
        .map_err(|e| to_write_error(e.into_error().into()))?
        .sync_all()
        .map_err(|e| to_write_error(e.into()))?;
    Ok(staged)
}

pub fn write_results(path: &Path, results: &[ClassificationResult]) -> Result<(), CsvError> {
    stage_results(path, results)?.commit()
}

/// Full precision with a decimal comma; integral values keep one decimal.
fn format_confidence(confidence: f64) -> String {
    let mut text = confidence.to_string();
    if !text.contains('.') {
        text.push_str(".0");
    }
    text.replace('.', ",")
}

/// `;`-separated, decimal comma, UTF-8 with BOM.
pub fn write_results_to<W: Write>(
    mut writer: W,
    results: &[ClassificationResult],
) -> Result<(), csv::Error> {
    writer.write_all(UTF8_BOM)?;
    let mut csv_writer = csv::WriterBuilder::new()
        .delimiter(b';')
        .from_writer(writer);

    csv_writer.write_record(OUTPUT_HEADER)?;
    for r in results {
        let amount = r.amount.to_decimal_comma();
        let confidence = format_confidence(r.confidence);
        csv_writer.write_record([
            r.date.as_str(),
            r.original_description.as_deref().unwrap_or_default(),
            amount.as_str(),
            r.debit.as_deref().unwrap_or_default(),
            r.credit.as_deref().unwrap_or_default(),
            r.group_label.as_str(),
            r.subgroup_label.as_str(),
            r.method.label(),
            confidence.as_str(),
        ])?;
    }
    csv_writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use contaflow_core::ClassificationMethod;

    fn table(data: &[u8]) -> Table {
        Table::from_bytes(data, Path::new("test.csv")).unwrap()
    }

    // ── decoding and separator detection ──────────────────────────────────────

    #[test]
    fn semicolon_separated_with_bom() {
        let t = table("\u{feff}Codigo;Grupo;Subgrupo\n301;Despesas;Aluguel\n".as_bytes());
        assert_eq!(t.headers(), &["codigo", "grupo", "subgrupo"]);
        assert_eq!(t.len(), 1);
    }

    #[test]
    fn comma_separated_fallback() {
        let t = table(b"codigo,grupo,subgrupo\n301,Despesas,Aluguel\n");
        assert_eq!(t.headers().len(), 3);
    }

    #[test]
    fn tab_separated_fallback() {
        let t = table(b"codigo\tgrupo\tsubgrupo\n301\tDespesas\tAluguel\n");
        assert_eq!(t.headers().len(), 3);
    }

    #[test]
    fn latin1_fallback() {
        // "Descrição;Valor" / "Manutenção;-10,00" in Latin-1.
        let data = b"Descri\xe7\xe3o;Valor\nManuten\xe7\xe3o;-10,00\n";
        let txs = transactions_from_table(&table(data)).unwrap();
        assert_eq!(txs[0].description.as_deref(), Some("Manutenção"));
        assert_eq!(txs[0].amount, Money::from_cents(-1000));
    }

    #[test]
    fn single_column_is_undetectable() {
        let err = Table::from_bytes(b"apenas\numa coluna\n", Path::new("x.csv")).unwrap_err();
        assert!(matches!(err, CsvError::Undetectable(_)));
    }

    #[test]
    fn missing_file_names_the_path() {
        let err = Table::read(Path::new("/nonexistent/plano.csv")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/plano.csv"));
    }

    // ── knowledge base ────────────────────────────────────────────────────────

    #[test]
    fn knowledge_base_columns_and_aliases() {
        let t = table("Código;Grupo;Subgrupos;Movimentação\n 301 ;Despesas;Aluguel;Saída\n302;;Energia;\n".as_bytes());
        let kb = knowledge_base_from_table(&t).unwrap();
        assert_eq!(kb.len(), 2);
        let first = &kb.accounts()[0];
        assert_eq!(first.code, "301");
        assert_eq!(first.subgroup, "Aluguel");
        assert_eq!(first.movement.as_deref(), Some("Saída"));
        let second = &kb.accounts()[1];
        assert_eq!(second.group, "");
        assert_eq!(second.movement, None);
    }

    #[test]
    fn knowledge_base_requires_subgroup() {
        let t = table(b"codigo;grupo\n301;Despesas\n");
        let err = knowledge_base_from_table(&t).unwrap_err();
        match err {
            CsvError::MissingColumn { column, .. } => assert_eq!(column, "subgrupo"),
            other => panic!("unexpected error: {other}"),
        }
    }

    // ── training examples ─────────────────────────────────────────────────────

    #[test]
    fn training_examples_skip_incomplete_rows() {
        let t = table(b"DescricaoExemplo;CodigoCorreto\nconta de luz;412\n;301\naluguel;\n");
        let examples = training_examples_from_table(&t).unwrap();
        assert_eq!(examples, vec![TrainingExample::new("conta de luz", "412")]);
    }

    #[test]
    fn training_examples_accept_migrated_headers() {
        let t = table(b"descricao;codigo_correto\ntarifa ted;520\n");
        let examples = training_examples_from_table(&t).unwrap();
        assert_eq!(examples[0].code, "520");
    }

    // ── transactions ──────────────────────────────────────────────────────────

    #[test]
    fn transactions_with_category_aliases() {
        let t = table(
            "Data;Histórico;Valor;Categoria;Subcategoria\n01/03/2024;Aluguel loja;-1.500,00;Despesas;Aluguel\n02/03/2024;Venda;2000.00;;\n"
                .as_bytes(),
        );
        let txs = transactions_from_table(&t).unwrap();
        assert_eq!(txs.len(), 2);
        assert_eq!(txs[0].date, "01/03/2024");
        assert_eq!(txs[0].group.as_deref(), Some("Despesas"));
        assert_eq!(txs[0].subgroup.as_deref(), Some("Aluguel"));
        assert_eq!(txs[0].amount, Money::from_cents(-150000));
        assert_eq!(txs[1].group, None);
        assert_eq!(txs[1].subgroup, None);
        assert_eq!(txs[1].amount, Money::from_cents(200000));
    }

    #[test]
    fn unparseable_amount_becomes_zero() {
        let t = table(b"descricao;valor\nx;abc\ny;\n");
        let txs = transactions_from_table(&t).unwrap();
        assert!(txs.iter().all(|t| t.amount.is_zero()));
    }

    #[test]
    fn transactions_require_amount_column() {
        let t = table(b"data;descricao\n01/03/2024;x\n");
        let err = transactions_from_table(&t).unwrap_err();
        assert!(err.to_string().contains("'valor'"));
        assert!(err.to_string().contains("test.csv"));
    }

    // ── output ────────────────────────────────────────────────────────────────

    #[test]
    fn writes_semicolon_decimal_comma_with_bom() {
        let results = vec![ClassificationResult {
            date: "01/03/2024".to_string(),
            original_description: Some("Aluguel loja".to_string()),
            amount: Money::from_cents(-150000),
            code: "301".to_string(),
            debit: Some("301".to_string()),
            credit: None,
            group_label: "Despesas".to_string(),
            subgroup_label: "Aluguel".to_string(),
            method: ClassificationMethod::GroupAndSubgroup,
            confidence: 1.0,
        }];
        let mut buf = Vec::new();
        write_results_to(&mut buf, &results).unwrap();

        assert!(buf.starts_with(UTF8_BOM));
        let text = String::from_utf8(buf[UTF8_BOM.len()..].to_vec()).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next().unwrap(),
            "Data;DescricaoOriginal;Valor;Débito;Crédito;GrupoClassificado;SubgrupoClassificado;Metodo;Confianca"
        );
        assert_eq!(
            lines.next().unwrap(),
            "01/03/2024;Aluguel loja;-1500,00;301;;Despesas;Aluguel;Regra (Grupo+Subgrupo);1,0"
        );
    }

    #[test]
    fn confidence_keeps_full_precision() {
        assert_eq!(format_confidence(0.695), "0,695");
        assert_eq!(format_confidence(0.0), "0,0");
        assert_eq!(format_confidence(1.0), "1,0");
    }

    #[test]
    fn staged_output_is_invisible_until_committed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("classificado.csv");

        let staged = stage_results(&path, &[]).unwrap();
        assert!(!path.exists());
        drop(staged);
        assert!(!path.exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);

        stage_results(&path, &[]).unwrap().commit().unwrap();
        assert!(path.exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn write_results_creates_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("saida").join("classificado.csv");
        write_results(&path, &[]).unwrap();
        assert!(path.exists());
    }
}
