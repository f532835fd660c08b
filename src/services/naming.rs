//! Season folder naming
//!
//! Derives the localized library season folder ("Temporada 02") from a release
//! name such as `Show.S02.1080p.WEB-DL` or `Show S02E05 720p`.

use regex::Regex;

use crate::error::EngineError;

#[derive(Debug, Clone)]
pub struct SeasonNaming {
    label: String,
    season_re: Regex,
}

impl SeasonNaming {
    pub fn new(label: impl Into<String>) -> Result<Self, EngineError> {
        let season_re = Regex::new(r"(?i)\bS(\d{1,2})(?:E\d{1,3}|\b)")
            .map_err(|e| EngineError::Config(format!("invalid season pattern: {e}")))?;
        Ok(Self {
            label: label.into(),
            season_re,
        })
    }

    /// Season number encoded in a release name.
    pub fn season_number(&self, release_name: &str) -> Option<u32> {
        self.season_re
            .captures(release_name)
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse().ok())
    }

    /// Library folder name for the season a release belongs to.
    pub fn season_folder_name(&self, release_name: &str) -> Result<String, EngineError> {
        let season = self.season_number(release_name).ok_or_else(|| {
            EngineError::IncorrectWorkingReference(format!(
                "could not determine season from: {release_name}"
            ))
        })?;
        Ok(format!("{} {:02}", self.label, season))
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn naming() -> SeasonNaming {
        SeasonNaming::new("Temporada").unwrap()
    }

    #[test]
    fn season_pack_folder_names() {
        let naming = naming();
        assert_eq!(naming.season_folder_name("Show.S02.1080p.WEB-DL").unwrap(), "Temporada 02");
        assert_eq!(naming.season_folder_name("Show S10 Complete").unwrap(), "Temporada 10");
        assert_eq!(naming.season_folder_name("show.s3.720p").unwrap(), "Temporada 03");
    }

    #[test]
    fn episode_titles() {
        let naming = naming();
        assert_eq!(
            naming.season_folder_name("Rick y Morty S06E01 HMAX WEB-DL 1080p").unwrap(),
            "Temporada 06"
        );
        assert_eq!(naming.season_folder_name("P-Valley.S02E10.mkv").unwrap(), "Temporada 02");
    }

    #[test]
    fn words_starting_with_s_do_not_match() {
        let naming = naming();
        assert_eq!(naming.season_number("Sopranos Special"), None);
        assert_eq!(naming.season_number("Shows12 Extra"), None);
    }

    #[test]
    fn unparseable_name_is_incorrect_reference() {
        assert_matches!(
            naming().season_folder_name("Some Movie 2021 1080p"),
            Err(EngineError::IncorrectWorkingReference(_))
        );
    }

    #[test]
    fn label_is_configurable() {
        let naming = SeasonNaming::new("Season").unwrap();
        assert_eq!(naming.season_folder_name("Show S01E01").unwrap(), "Season 01");
    }
}
