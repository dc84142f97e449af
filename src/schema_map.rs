//! The declarative schema map: five fixed logical datasets, each with a
//! canonical-column alias table and a required-column list.
//!
//! The document is parsed once and validated eagerly — a malformed schema
//! map is a setup defect and aborts, while malformed *data* never does.
//! Alias entries keep their document order because resolution priority is
//! positional (canonical name first, then aliases in listed order).

use std::{collections::BTreeMap, fmt, fs, path::Path, str::FromStr};

use anyhow::{Context, Result, anyhow, bail};
use serde_yaml::Value;

use crate::data::normalize_token;

/// The five logical datasets the pipeline materializes. Closed set: cleaning
/// rules dispatch over this enum, never over free-form strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Dataset {
    Sales,
    Customers,
    Branches,
    Inventory,
    Digital,
}

impl Dataset {
    pub const ALL: [Dataset; 5] = [
        Dataset::Sales,
        Dataset::Customers,
        Dataset::Branches,
        Dataset::Inventory,
        Dataset::Digital,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Dataset::Sales => "sales",
            Dataset::Customers => "customers",
            Dataset::Branches => "branches",
            Dataset::Inventory => "inventory",
            Dataset::Digital => "digital",
        }
    }

    /// Preferred worksheet name inside spreadsheet workbooks.
    pub fn sheet_name(&self) -> &'static str {
        match self {
            Dataset::Sales => "Ventas",
            Dataset::Customers => "Clientes",
            Dataset::Branches => "Sucursales",
            Dataset::Inventory => "Inventarios",
            Dataset::Digital => "Canales_Digitales",
        }
    }

    /// Filename-stem tokens that identify this dataset among raw files.
    pub fn source_aliases(&self) -> &'static [&'static str] {
        match self {
            Dataset::Sales => &["ventas", "ventascsv", "sales", "transactions"],
            Dataset::Customers => &["clientes", "customers", "customer"],
            Dataset::Branches => &["sucursales", "branches", "stores"],
            Dataset::Inventory => &["inventarios", "inventory", "stock"],
            Dataset::Digital => &["canales_digitales", "digital", "social", "marketing"],
        }
    }
}

impl fmt::Display for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Dataset {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "sales" => Ok(Dataset::Sales),
            "customers" => Ok(Dataset::Customers),
            "branches" => Ok(Dataset::Branches),
            "inventory" => Ok(Dataset::Inventory),
            "digital" => Ok(Dataset::Digital),
            other => Err(anyhow!(
                "Unknown dataset '{other}'. Expected one of: sales, customers, branches, inventory, digital"
            )),
        }
    }
}

/// Per-dataset schema entry: canonical column → acceptable source aliases,
/// in document order, plus the required-column list for validation.
#[derive(Debug, Clone, Default)]
pub struct DatasetSchema {
    pub canonical_to_aliases: Vec<(String, Vec<String>)>,
    pub required_columns: Vec<String>,
}

impl DatasetSchema {
    /// Candidate tokens for one canonical column: the canonical name itself
    /// always outranks its aliases.
    pub fn candidates(canonical: &str, aliases: &[String]) -> Vec<String> {
        let mut tokens = vec![normalize_token(canonical)];
        tokens.extend(aliases.iter().map(|a| normalize_token(a)));
        tokens
    }
}

#[derive(Debug, Clone, Default)]
pub struct SchemaMap {
    datasets: BTreeMap<Dataset, DatasetSchema>,
}

impl SchemaMap {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Reading schema map from {path:?}"))?;
        Self::from_yaml_str(&raw).with_context(|| format!("Parsing schema map {path:?}"))
    }

    pub fn from_yaml_str(raw: &str) -> Result<Self> {
        let document: Value = serde_yaml::from_str(raw).context("Parsing schema map YAML")?;
        let root = document
            .as_mapping()
            .ok_or_else(|| anyhow!("Schema map root must be a mapping"))?;
        let datasets_value = root
            .get("datasets")
            .ok_or_else(|| anyhow!("Schema map must contain a 'datasets' section"))?;
        let datasets_map = datasets_value
            .as_mapping()
            .ok_or_else(|| anyhow!("'datasets' must be a mapping of dataset name to schema"))?;

        let mut datasets = BTreeMap::new();
        for (name_value, entry) in datasets_map {
            let name = name_value
                .as_str()
                .ok_or_else(|| anyhow!("Dataset names must be strings"))?;
            let dataset = Dataset::from_str(name)?;
            datasets.insert(dataset, parse_dataset_entry(name, entry)?);
        }
        Ok(Self { datasets })
    }

    pub fn dataset(&self, dataset: Dataset) -> Option<&DatasetSchema> {
        self.datasets.get(&dataset)
    }
}

fn parse_dataset_entry(name: &str, entry: &Value) -> Result<DatasetSchema> {
    let mapping = entry
        .as_mapping()
        .ok_or_else(|| anyhow!("Schema entry for '{name}' must be a mapping"))?;

    let mut schema = DatasetSchema::default();
    if let Some(columns) = mapping.get("columns") {
        let columns = columns
            .as_mapping()
            .ok_or_else(|| anyhow!("'columns' for '{name}' must be a mapping"))?;
        for (canonical_value, aliases_value) in columns {
            let canonical = canonical_value
                .as_str()
                .ok_or_else(|| anyhow!("Canonical column names in '{name}' must be strings"))?;
            let aliases = parse_string_list(aliases_value)
                .with_context(|| format!("Aliases for '{name}.{canonical}'"))?;
            schema
                .canonical_to_aliases
                .push((canonical.to_string(), aliases));
        }
    }
    if let Some(required) = mapping.get("required_columns") {
        schema.required_columns =
            parse_string_list(required).with_context(|| format!("required_columns for '{name}'"))?;
    }
    Ok(schema)
}

fn parse_string_list(value: &Value) -> Result<Vec<String>> {
    let sequence = match value {
        Value::Sequence(items) => items,
        Value::Null => return Ok(Vec::new()),
        other => bail!("Expected a list of strings, found {other:?}"),
    };
    sequence
        .iter()
        .map(|item| {
            item.as_str()
                .map(str::to_string)
                .ok_or_else(|| anyhow!("List entries must be strings, found {item:?}"))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
datasets:
  sales:
    columns:
      ticket_id: [Ticket_ID]
      total_sale: [Total_Venta, Venta_Total]
    required_columns: [ticket_id, total_sale]
  branches:
    columns:
      branch_id: [Sucursal_ID]
"#;

    #[test]
    fn parses_datasets_and_preserves_alias_order() {
        let map = SchemaMap::from_yaml_str(SAMPLE).unwrap();
        let sales = map.dataset(Dataset::Sales).unwrap();
        assert_eq!(sales.required_columns, ["ticket_id", "total_sale"]);
        let (canonical, aliases) = &sales.canonical_to_aliases[1];
        assert_eq!(canonical, "total_sale");
        assert_eq!(aliases, &["Total_Venta", "Venta_Total"]);

        let branches = map.dataset(Dataset::Branches).unwrap();
        assert!(branches.required_columns.is_empty());
        assert!(map.dataset(Dataset::Digital).is_none());
    }

    #[test]
    fn rejects_unknown_dataset_names() {
        let raw = "datasets:\n  invoices:\n    columns: {}\n";
        assert!(SchemaMap::from_yaml_str(raw).is_err());
    }

    #[test]
    fn rejects_non_mapping_root() {
        assert!(SchemaMap::from_yaml_str("- just\n- a\n- list\n").is_err());
    }
}
