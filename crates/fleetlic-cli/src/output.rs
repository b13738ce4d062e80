use colored::Colorize;
use fleetlic_engine::SimulationResponse;
use fleetlic_model::{TypeForest, TypeIdx};

const HEADERS: [&str; 6] = ["PRODUCT", "TAG", "METRIC", "OLD", "NEW", "DELTA"];

pub fn license_table(response: &SimulationResponse) -> String {
    let rows: Vec<[String; 6]> = response
        .licenses
        .iter()
        .map(|row| {
            [
                row.product.name.clone(),
                row.product.tag.clone(),
                row.metric_name.clone(),
                row.old_licenses.to_string(),
                row.new_licenses.to_string(),
                format!("{:+}", row.delta),
            ]
        })
        .collect();

    let mut widths = HEADERS.map(str::len);
    for row in &rows {
        for (w, cell) in widths.iter_mut().zip(row) {
            *w = (*w).max(cell.len());
        }
    }

    let mut out = String::new();
    let header: Vec<String> = HEADERS
        .iter()
        .zip(widths)
        .map(|(h, w)| format!("{h:<w$}"))
        .collect();
    out.push_str(&format!("{}\n", header.join("  ").bold()));

    for (row, response_row) in rows.iter().zip(&response.licenses) {
        let mut cells: Vec<String> = row
            .iter()
            .zip(widths)
            .enumerate()
            .map(|(i, (cell, w))| {
                if i >= 3 {
                    format!("{cell:>w$}")
                } else {
                    format!("{cell:<w$}")
                }
            })
            .collect();
        if let Some(delta) = cells.last_mut() {
            *delta = match response_row.delta {
                d if d > 0 => delta.red().to_string(),
                d if d < 0 => delta.green().to_string(),
                _ => delta.dimmed().to_string(),
            };
        }
        out.push_str(&cells.join("  "));
        out.push('\n');
    }
    out
}

/// Indented type tree, roots first.
pub fn type_forest(forest: &TypeForest) -> String {
    let mut out = String::new();
    for (idx, _) in forest.iter().filter(|(i, _)| forest.parent_of(*i).is_none()) {
        write_subtree(forest, idx, 0, &mut out);
    }
    out
}

fn write_subtree(forest: &TypeForest, idx: TypeIdx, level: usize, out: &mut String) {
    let ty = forest.get(idx);
    let attrs: Vec<&str> = ty.attributes.iter().map(|a| a.name.as_str()).collect();
    out.push_str(&format!(
        "{:indent$}{} [{}] {}\n",
        "",
        ty.type_name.bold(),
        ty.id,
        attrs.join(", ").dimmed(),
        indent = level * 2
    ));
    for (child, _) in forest.iter().filter(|(i, _)| forest.parent_of(*i) == Some(idx)) {
        write_subtree(forest, child, level + 1, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetlic_engine::ProductLicenseDelta;
    use fleetlic_model::{EquipmentType, ProductData};

    #[test]
    fn table_lists_every_row() {
        colored::control::set_override(false);
        let response = SimulationResponse {
            licenses: vec![ProductLicenseDelta {
                metric_name: "ibm.pvu.standard".into(),
                old_licenses: 7,
                new_licenses: 3,
                delta: -4,
                product: ProductData::new("WebSphere", "IBM-WAS"),
            }],
        };
        let table = license_table(&response);
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("PRODUCT"));
        assert!(lines[1].contains("IBM-WAS"));
        assert!(lines[1].trim_end().ends_with("-4"));
    }

    #[test]
    fn forest_nests_children() {
        colored::control::set_override(false);
        let forest = TypeForest::new(vec![
            EquipmentType::new("2", "Server").with_parent("3"),
            EquipmentType::new("3", "Cluster"),
        ])
        .unwrap();
        let text = type_forest(&forest);
        let lines: Vec<&str> = text.lines().collect();
        assert!(lines[0].starts_with("Cluster [3]"));
        assert!(lines[1].starts_with("  Server [2]"));
    }
}
