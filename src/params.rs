use crate::error::{ReportError, Result};
use crate::schema::{ParamDefinition, ParamValue, ReferenceTarget, ReportInstance};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    Str,
    Num,
    Ref,
}

impl ParamType {
    pub fn from_tag(tag: &str) -> Result<Self> {
        match tag {
            "str" => Ok(ParamType::Str),
            "num" => Ok(ParamType::Num),
            "ref" => Ok(ParamType::Ref),
            other => Err(ReportError::UnsupportedParamType(other.to_string())),
        }
    }
}

/// A resolved parameter value, as seen by expressions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamScalar {
    Num(f64),
    Str(String),
    Null,
}

/// Name to value mapping handed to the expression processor.
pub type ParamContext = BTreeMap<String, ParamScalar>;

/// Search over the records of a reference parameter's target model.
pub trait ReferenceLookup {
    /// Returns the `value_field` of every record of `target.model` whose
    /// `search_field` equals `key`, in the model's natural order.
    fn search(&self, target: &ReferenceTarget, key: &str) -> Vec<ParamScalar>;
}

/// Lookup for setups without reference parameters: never finds anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoReferences;

impl ReferenceLookup for NoReferences {
    fn search(&self, _target: &ReferenceTarget, _key: &str) -> Vec<ParamScalar> {
        Vec::new()
    }
}

pub fn resolve_value(value: &ParamValue, lookup: &dyn ReferenceLookup) -> Result<ParamScalar> {
    match ParamType::from_tag(&value.param.param_type)? {
        ParamType::Str => Ok(value
            .val_str
            .clone()
            .map(ParamScalar::Str)
            .unwrap_or(ParamScalar::Null)),
        ParamType::Num => Ok(value
            .val_num
            .map(ParamScalar::Num)
            .unwrap_or(ParamScalar::Null)),
        ParamType::Ref => resolve_reference(value, lookup),
    }
}

fn resolve_reference(value: &ParamValue, lookup: &dyn ReferenceLookup) -> Result<ParamScalar> {
    let key = value.val_ref.clone().unwrap_or_default();
    let Some(target) = value.param.reference.as_ref() else {
        return Err(ReportError::ParamResolution {
            param: value.name().to_string(),
            model: String::new(),
            search_field: String::new(),
            value: key,
        });
    };

    match lookup.search(target, &key).into_iter().next() {
        Some(found) => Ok(found),
        None => Err(ReportError::ParamResolution {
            param: value.name().to_string(),
            model: target.model_label().to_string(),
            search_field: target.search_field_label().to_string(),
            value: key,
        }),
    }
}

/// Resolves every parameter value of an instance.
pub fn param_values(
    instance: &ReportInstance,
    lookup: &dyn ReferenceLookup,
) -> Result<ParamContext> {
    let mut context = ParamContext::new();
    for value in &instance.param_values {
        let resolved = resolve_value(value, lookup)?;
        debug!("Parameter {} resolved to {:?}", value.name(), resolved);
        context.insert(value.name().to_string(), resolved);
    }
    Ok(context)
}

/// The stored value as shown to users.
pub fn display_value(value: &ParamValue) -> Result<String> {
    Ok(match ParamType::from_tag(&value.param.param_type)? {
        ParamType::Str => value.val_str.clone().unwrap_or_default(),
        ParamType::Num => value.val_num.map(|n| n.to_string()).unwrap_or_default(),
        ParamType::Ref => value.val_ref.clone().unwrap_or_default(),
    })
}

/// Describes how a reference parameter is looked up, e.g. ": to Partner found by value Reference".
pub fn ref_description(param: &ParamDefinition) -> Option<String> {
    if param.param_type != "ref" {
        return None;
    }
    param.reference.as_ref().map(|target| {
        format!(
            ": to {} found by value {}",
            target.model_label(),
            target.search_field_label()
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    struct Partners;

    impl ReferenceLookup for Partners {
        fn search(&self, target: &ReferenceTarget, key: &str) -> Vec<ParamScalar> {
            assert_eq!(target.model, "res.partner");
            assert_eq!(target.search_field, "ref");
            match key {
                "ACME" => vec![ParamScalar::Num(12.0), ParamScalar::Num(13.0)],
                _ => Vec::new(),
            }
        }
    }

    fn definition(name: &str, param_type: &str) -> ParamDefinition {
        ParamDefinition {
            id: 1,
            name: name.to_string(),
            sequence: 1,
            param_type: param_type.to_string(),
            reference: (param_type == "ref").then(|| ReferenceTarget {
                model: "res.partner".to_string(),
                model_description: Some("Contact".to_string()),
                search_field: "ref".to_string(),
                search_field_description: Some("Internal Reference".to_string()),
                value_field: "id".to_string(),
            }),
        }
    }

    #[test]
    fn test_scalar_types() {
        let mut value = ParamValue::new(definition("label", "str"));
        value.val_str = Some("North".to_string());
        assert_eq!(
            resolve_value(&value, &NoReferences).unwrap(),
            ParamScalar::Str("North".to_string())
        );
        assert_eq!(display_value(&value).unwrap(), "North");

        let mut value = ParamValue::new(definition("rate", "num"));
        value.val_num = Some(0.21);
        assert_eq!(
            resolve_value(&value, &NoReferences).unwrap(),
            ParamScalar::Num(0.21)
        );
        assert_eq!(display_value(&value).unwrap(), "0.21");
    }

    #[test]
    fn test_reference_takes_first_match() {
        let mut value = ParamValue::new(definition("partner", "ref"));
        value.val_ref = Some("ACME".to_string());
        assert_eq!(
            resolve_value(&value, &Partners).unwrap(),
            ParamScalar::Num(12.0)
        );
        assert_eq!(display_value(&value).unwrap(), "ACME");
    }

    #[test]
    fn test_reference_without_match_fails() {
        let mut value = ParamValue::new(definition("partner", "ref"));
        value.val_ref = Some("Nobody".to_string());
        let err = resolve_value(&value, &Partners).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Computation);
        assert_eq!(
            err.to_string(),
            "Parameter 'partner' error. Can't find any Contact records with Internal Reference equal to 'Nobody'."
        );
    }

    #[test]
    fn test_unsupported_type() {
        let value = ParamValue::new(definition("when", "date"));
        assert!(matches!(
            resolve_value(&value, &NoReferences),
            Err(ReportError::UnsupportedParamType(ref t)) if t == "date"
        ));
        assert!(display_value(&value).is_err());
    }

    #[test]
    fn test_param_values_and_description() {
        let mut instance = ReportInstance::new(1, "Test");
        let mut rate = ParamValue::new(definition("rate", "num"));
        rate.val_num = Some(2.0);
        let mut partner = ParamValue::new(definition("partner", "ref"));
        partner.param.id = 2;
        partner.val_ref = Some("ACME".to_string());
        instance.param_values = vec![rate, partner];

        let context = param_values(&instance, &Partners).unwrap();
        assert_eq!(context.len(), 2);
        assert_eq!(context["rate"], ParamScalar::Num(2.0));
        assert_eq!(context["partner"], ParamScalar::Num(12.0));

        assert_eq!(
            ref_description(&definition("partner", "ref")).as_deref(),
            Some(": to Contact found by value Internal Reference")
        );
        assert_eq!(ref_description(&definition("rate", "num")), None);
    }
}
