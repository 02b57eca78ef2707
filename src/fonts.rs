//! Web font resolution: collects `@font-face` rules of the host's stylesheets
//! and embeds their font files.

use crate::host::{CssRule, CssRuleKind, Host};
use crate::inliner::{should_process, CssInliner};
use crate::Result;
use log::{debug, warn};

/// A font-face rule selected for embedding, with its sheet's location
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebFont {
    pub rule: CssRule,
    pub base_url: Option<String>,
}

pub struct FontResolver<'a> {
    host: &'a dyn Host,
    inliner: &'a CssInliner<'a>,
}

impl<'a> FontResolver<'a> {
    pub fn new(host: &'a dyn Host, inliner: &'a CssInliner<'a>) -> Self {
        Self { host, inliner }
    }

    /// Font-face rules with at least one inlinable `src` reference. Sheets
    /// that refuse enumeration are skipped.
    pub fn web_fonts(&self) -> Vec<WebFont> {
        let mut fonts = Vec::new();
        for sheet in self.host.style_sheets() {
            let sheet = match sheet {
                Ok(sheet) => sheet,
                Err(e) => {
                    warn!("Error while reading CSS rules: {}", e);
                    continue;
                }
            };
            for rule in sheet.rules {
                if rule.kind != CssRuleKind::FontFace {
                    continue;
                }
                if rule.font_src().is_some_and(|src| should_process(&src)) {
                    fonts.push(WebFont {
                        rule,
                        base_url: sheet.href.clone(),
                    });
                }
            }
        }
        fonts
    }

    /// Embed every web font and return the rules as one style block
    pub async fn resolve_all(&self) -> Result<String> {
        let fonts = self.web_fonts();
        debug!("resolving {} web font rule(s)", fonts.len());
        let mut resolved = Vec::with_capacity(fonts.len());
        for font in &fonts {
            let css = self
                .inliner
                .inline_all(&font.rule.css_text, font.base_url.as_deref())
                .await?;
            resolved.push(css);
        }
        Ok(resolved.join("\n"))
    }
}
