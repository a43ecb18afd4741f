//! Locale negotiation from the `Accept-Language` header.

use crate::config::LocaleConfig;

impl LocaleConfig {
    /// Picks the supported locale the browser prefers most.
    ///
    /// Only the primary language subtag is compared, so `nl-BE` selects
    /// `nl`. Falls back to the default locale.
    #[must_use]
    pub fn negotiate(&self, accept_language: Option<&str>) -> String {
        let Some(header) = accept_language else {
            return self.default.clone();
        };

        let mut ranges: Vec<(String, f32)> = header
            .split(',')
            .filter_map(|entry| {
                let mut parts = entry.trim().split(';');
                let tag = parts.next()?.trim();
                if tag.is_empty() {
                    return None;
                }
                let quality = parts
                    .find_map(|p| p.trim().strip_prefix("q="))
                    .and_then(|q| q.trim().parse::<f32>().ok())
                    .unwrap_or(1.0);
                let primary = tag.split('-').next().unwrap_or(tag).to_ascii_lowercase();
                Some((primary, quality))
            })
            .filter(|(_, quality)| *quality > 0.0)
            .collect();

        // Stable sort keeps header order for equal weights.
        ranges.sort_by(|a, b| b.1.total_cmp(&a.1));

        ranges
            .into_iter()
            .find_map(|(primary, _)| {
                self.supported
                    .iter()
                    .find(|s| s.eq_ignore_ascii_case(&primary))
                    .cloned()
            })
            .unwrap_or_else(|| self.default.clone())
    }
}
