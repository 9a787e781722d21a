use crate::catalog::Catalog;
use crate::entities::BuildRequest;
use crate::error::SpkError::InvalidArgument;
use anyhow::Result;

/// Resolves the raw `--dsm-version` and `--processor` values into a [`BuildRequest`]
///
/// A missing DSM version defaults to the latest release in the catalog. The
/// processor has no default.
///
/// # Errors
///
/// Returns [`InvalidArgument`] if:
/// - The processor is missing or empty
/// - Either value is not listed in the catalog
pub fn resolve(
    catalog: &Catalog,
    dsm_version: Option<&str>,
    processor: Option<&str>,
) -> Result<BuildRequest> {
    let version = match dsm_version.map(str::trim) {
        Some(requested) => catalog.version(requested).ok_or_else(|| {
            InvalidArgument(format!(
                "unsupported DSM version '{requested}' (choose from: {})",
                catalog
                    .versions()
                    .iter()
                    .map(|v| v.version.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            ))
        })?,
        None => catalog
            .latest_version()
            .ok_or_else(|| InvalidArgument("catalog lists no DSM versions".into()))?,
    };

    let requested = processor
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .ok_or_else(|| InvalidArgument("--processor is required".into()))?;
    let processor = catalog.processor(requested).ok_or_else(|| {
        InvalidArgument(format!(
            "unsupported processor '{requested}' (choose from: {})",
            processor_choices(catalog)
        ))
    })?;

    Ok(BuildRequest {
        version: version.clone(),
        processor: processor.clone(),
    })
}

/// Comma-separated processor family names, for help and error texts
#[must_use]
pub fn processor_choices(catalog: &Catalog) -> String {
    catalog
        .processors()
        .iter()
        .map(|p| p.family.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SpkError;

    fn is_invalid_argument(error: &anyhow::Error) -> bool {
        matches!(
            error.downcast_ref::<SpkError>(),
            Some(SpkError::InvalidArgument(_))
        )
    }

    #[test]
    fn test_every_catalog_pair_resolves() {
        let catalog = Catalog::builtin();
        for version in catalog.versions() {
            for processor in catalog.processors() {
                let request =
                    resolve(&catalog, Some(&version.version), Some(&processor.family)).unwrap();
                assert_eq!(version, &request.version);
                assert_eq!(processor, &request.processor);
            }
        }
    }

    #[test]
    fn test_default_version_is_latest() {
        let catalog = Catalog::builtin();
        let request = resolve(&catalog, None, Some("apollolake")).unwrap();
        assert_eq!("7.2", request.version.version);
    }

    #[test]
    fn test_missing_processor() {
        let catalog = Catalog::builtin();
        let error = resolve(&catalog, Some("7.2"), None).unwrap_err();
        assert!(is_invalid_argument(&error));

        let error = resolve(&catalog, None, Some("  ")).unwrap_err();
        assert!(is_invalid_argument(&error));
    }

    #[test]
    fn test_unknown_version_lists_choices() {
        let catalog = Catalog::builtin();
        let error = resolve(&catalog, Some("5.2"), Some("apollolake")).unwrap_err();
        assert!(is_invalid_argument(&error));
        let message = error.to_string();
        assert!(message.contains("'5.2'"));
        assert!(message.contains("6.0, 6.1, 6.2, 6.2.2, 6.2.3, 6.2.4, 7.0, 7.1, 7.2"));
    }

    #[test]
    fn test_unknown_processor() {
        let catalog = Catalog::builtin();
        let error = resolve(&catalog, Some("7.2"), Some("Apollolake")).unwrap_err();
        assert!(is_invalid_argument(&error));
        assert!(error.to_string().contains("geminilake"));
    }

    #[test]
    fn test_values_are_trimmed() {
        let catalog = Catalog::builtin();
        let request = resolve(&catalog, Some(" 6.2.4 "), Some("armada38x\n")).unwrap();
        assert_eq!("6.2.4", request.version.version);
        assert_eq!("armada38x", request.processor.family);
    }
}
