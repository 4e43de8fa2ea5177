//! Post-generation grounding check: do the locators a script uses exist in
//! the reference markup?

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::LazyLock;

use anyhow::Result;
use lol_html::{element, HtmlRewriter, Settings};
use regex::Regex;
use serde::Serialize;

/// `By.ID, "x"` and friends, with single or double quotes.
static BY_LOCATOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"By\.(ID|NAME|CLASS_NAME|CSS_SELECTOR)\s*,\s*(?:"([^"]*)"|'([^']*)')"#)
        .expect("locator pattern is valid")
});

static CSS_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z]*#([\w-]+)$").expect("css id pattern is valid"));
static CSS_CLASS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z]*\.([\w-]+)$").expect("css class pattern is valid"));
static CSS_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^[A-Za-z]*\[name=["']?([\w-]+)["']?\]$"#).expect("css name pattern is valid")
});

/// Ids, names and classes declared anywhere in a markup document.
#[derive(Debug, Default)]
pub struct MarkupSelectors {
    pub ids: BTreeSet<String>,
    pub names: BTreeSet<String>,
    pub classes: BTreeSet<String>,
}

impl MarkupSelectors {
    fn contains(&self, locator: &Locator) -> bool {
        match locator {
            Locator::Id(v) => self.ids.contains(v),
            Locator::Name(v) => self.names.contains(v),
            Locator::Class(v) => self.classes.contains(v),
        }
    }
}

pub fn scan_markup(markup: &str) -> Result<MarkupSelectors> {
    let found = RefCell::new(MarkupSelectors::default());
    let mut rewriter = HtmlRewriter::new(
        Settings {
            element_content_handlers: vec![element!("*", |el| {
                let mut found = found.borrow_mut();
                if let Some(id) = el.get_attribute("id") {
                    found.ids.insert(id);
                }
                if let Some(name) = el.get_attribute("name") {
                    found.names.insert(name);
                }
                if let Some(class) = el.get_attribute("class") {
                    for c in class.split_whitespace() {
                        found.classes.insert(c.to_string());
                    }
                }
                Ok(())
            })],
            ..Settings::default()
        },
        |_: &[u8]| {},
    );
    rewriter
        .write(markup.as_bytes())
        .map_err(|e| anyhow::anyhow!("markup scan failed: {}", e))?;
    rewriter
        .end()
        .map_err(|e| anyhow::anyhow!("markup scan failed: {}", e))?;
    Ok(found.into_inner())
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum Locator {
    Id(String),
    Name(String),
    Class(String),
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::Id(v) => write!(f, "id={}", v),
            Locator::Name(v) => write!(f, "name={}", v),
            Locator::Class(v) => write!(f, "class={}", v),
        }
    }
}

/// Locators a Selenium script references. CSS selectors are only understood
/// in their simple `#id`, `.class` and `[name=x]` forms; others are skipped.
pub fn script_locators(script: &str) -> BTreeSet<Locator> {
    let mut out = BTreeSet::new();
    for cap in BY_LOCATOR.captures_iter(script) {
        let value = cap
            .get(2)
            .or_else(|| cap.get(3))
            .map(|m| m.as_str().to_string())
            .unwrap_or_default();
        let locator = match &cap[1] {
            "ID" => Some(Locator::Id(value)),
            "NAME" => Some(Locator::Name(value)),
            "CLASS_NAME" => Some(Locator::Class(value)),
            _ => css_locator(&value),
        };
        if let Some(locator) = locator {
            out.insert(locator);
        }
    }
    out
}

fn css_locator(selector: &str) -> Option<Locator> {
    let selector = selector.trim();
    if let Some(c) = CSS_ID.captures(selector) {
        return Some(Locator::Id(c[1].to_string()));
    }
    if let Some(c) = CSS_CLASS.captures(selector) {
        return Some(Locator::Class(c[1].to_string()));
    }
    CSS_NAME
        .captures(selector)
        .map(|c| Locator::Name(c[1].to_string()))
}

/// Grounding findings attached to a generated script. Findings are flags for
/// the reader; the script is returned either way.
#[derive(Debug, Clone, Default, Serialize)]
pub struct GroundingReport {
    /// False when the markup could not be scanned.
    pub selectors_checked: bool,
    pub unknown_selectors: Vec<String>,
    pub reference_literal_present: bool,
}

impl GroundingReport {
    pub fn is_clean(&self) -> bool {
        self.unknown_selectors.is_empty() && self.reference_literal_present
    }
}

pub fn check_grounding(script: &str, markup: &str, reference_literal: &str) -> GroundingReport {
    let reference_literal_present = script.lines().any(|l| l.trim() == reference_literal);
    match scan_markup(markup) {
        Ok(known) => GroundingReport {
            selectors_checked: true,
            unknown_selectors: script_locators(script)
                .into_iter()
                .filter(|l| !known.contains(l))
                .map(|l| l.to_string())
                .collect(),
            reference_literal_present,
        },
        Err(e) => {
            tracing::warn!("Skipping selector check: {}", e);
            GroundingReport {
                selectors_checked: false,
                unknown_selectors: Vec::new(),
                reference_literal_present,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHECKOUT: &str = r#"<html><body>
        <input id="discount-code" name="code" class="field wide">
        <button id="apply-discount" class="btn primary">Apply</button>
        <span id="discount-msg"></span>
    </body></html>"#;

    #[test]
    fn test_scan_markup_collects_attributes() {
        let found = scan_markup(CHECKOUT).unwrap();
        assert!(found.ids.contains("apply-discount"));
        assert!(found.ids.contains("discount-msg"));
        assert!(found.names.contains("code"));
        assert!(found.classes.contains("wide"));
        assert!(found.classes.contains("primary"));
    }

    #[test]
    fn test_script_locators() {
        let script = r##"
wait.until(EC.element_to_be_clickable((By.ID, "apply-discount")))
driver.find_element(By.NAME, 'code')
driver.find_element(By.CLASS_NAME, "btn")
driver.find_element(By.CSS_SELECTOR, "#discount-msg")
driver.find_element(By.CSS_SELECTOR, "input[name='code']")
driver.find_element(By.CSS_SELECTOR, "div > span:nth-child(2)")
"##;
        let locators = script_locators(script);
        assert!(locators.contains(&Locator::Id("apply-discount".to_string())));
        assert!(locators.contains(&Locator::Name("code".to_string())));
        assert!(locators.contains(&Locator::Class("btn".to_string())));
        assert!(locators.contains(&Locator::Id("discount-msg".to_string())));
        assert_eq!(locators.len(), 4);
    }

    #[test]
    fn test_check_grounding_flags_unknown_selectors() {
        let literal = r#"html_file_path = "file:///tmp/checkout.html""#;
        let script = format!(
            "{}\nwait.until(EC.element_to_be_clickable((By.ID, \"apply-discount\")))\n\
             driver.find_element(By.ID, \"coupon-box\")\n",
            literal
        );
        let report = check_grounding(&script, CHECKOUT, literal);
        assert!(report.selectors_checked);
        assert!(report.reference_literal_present);
        assert_eq!(report.unknown_selectors, vec!["id=coupon-box".to_string()]);
        assert!(!report.is_clean());
    }

    #[test]
    fn test_check_grounding_missing_literal() {
        let report = check_grounding("driver.get('x')", CHECKOUT, "html_file_path = \"y\"");
        assert!(!report.reference_literal_present);
        assert!(report.unknown_selectors.is_empty());
    }
}
