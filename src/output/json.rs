use crate::model::ScanReport;
use anyhow::Result;

pub fn print_json(report: &ScanReport) -> Result<()> {
    println!("{}", render_json(report)?);
    Ok(())
}

pub fn render_json(report: &ScanReport) -> Result<String> {
    Ok(serde_json::to_string_pretty(report)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ScanError;
    use crate::model::{ScanTarget, TargetReport};
    use serde_json::Value;

    #[test]
    fn test_json_shape() {
        let report = ScanReport::new(vec![
            TargetReport::clean(ScanTarget::parse("bob").unwrap(), Vec::new()),
            TargetReport::failed(
                ScanTarget::parse("ghost").unwrap(),
                Vec::new(),
                &ScanError::UserNotFound("ghost".into()),
            ),
        ]);
        let value: Value = serde_json::from_str(&render_json(&report).unwrap()).unwrap();

        assert_eq!(value["targets"][0]["target"], "bob");
        assert_eq!(value["targets"][0]["status"], "clean");
        assert_eq!(value["targets"][1]["status"], "error");
        assert_eq!(value["targets"][1]["error"]["reason"], "UserNotFound");
        assert_eq!(value["summary"]["errored"], 1);
        assert_eq!(value["cancelled"], false);
        assert!(value.get("skipped").is_none());
    }
}
