use colored::Colorize;
use prettytable::{format, Cell, Row, Table};

use crate::models::resource::Resource;
use crate::services::freshness::StalenessPolicy;

pub struct DisplayFormatter;

impl DisplayFormatter {
    pub fn new() -> Self {
        Self
    }

    pub fn format_header(&self, text: &str) -> String {
        format!("\n=== {} ===", text.bright_white().bold())
    }

    pub fn format_table(&self, headers: &[&str], rows: &[Vec<String>]) -> String {
        let mut table = Table::new();
        table.set_format(*format::consts::FORMAT_NO_BORDER_LINE_SEPARATOR);

        table.add_row(Row::new(
            headers.iter().map(|h| Cell::new(h).style_spec("b")).collect(),
        ));

        for row in rows {
            table.add_row(Row::new(row.iter().map(|cell| Cell::new(cell)).collect()));
        }

        table.to_string()
    }

    pub fn format_policy(&self, policy: &StalenessPolicy) -> String {
        match policy {
            StalenessPolicy::Ttl(ttl) => format!("ttl ({}s)", ttl.as_secs()),
            StalenessPolicy::VersionProbe { .. } => "version probe".to_string(),
        }
    }

    /// Startup summary: port, cache policy and the route table.
    pub fn format_banner(&self, port: u16, policy: &StalenessPolicy) -> String {
        let rows: Vec<Vec<String>> = Resource::ALL
            .iter()
            .map(|r| {
                let upstream = match r.query() {
                    Some(query) => format!("/{}?{}", r.upstream_path(), query),
                    None => format!("/{}", r.upstream_path()),
                };
                vec![format!("GET {}", r.route()), upstream]
            })
            .collect();

        let mut output = Vec::new();
        output.push(self.format_header("LoL Static Data Passthrough"));
        output.push(format!(
            "Listening on port {}",
            port.to_string().green().bold()
        ));
        output.push(format!("Cache policy: {}", self.format_policy(policy)));
        output.push(self.format_table(&["Route", "Upstream"], &rows));
        output.join("\n")
    }
}

impl Default for DisplayFormatter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_banner_lists_every_route() {
        colored::control::set_override(false);
        let banner = DisplayFormatter::new()
            .format_banner(8080, &StalenessPolicy::Ttl(Duration::from_secs(1200)));
        assert!(banner.contains("Listening on port 8080"));
        assert!(banner.contains("ttl (1200s)"));
        for resource in Resource::ALL {
            assert!(banner.contains(resource.route()), "missing {}", resource.route());
        }
        assert!(banner.contains("/summoner-spell?spellData="));
    }
}
