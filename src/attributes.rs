//! Typed reads and writes of dataset attributes.

use dicom::core::value::{ConvertValueError, DataSetSequence};
use dicom::core::{DataElement, PrimitiveValue, Tag, VR};
use dicom::object::InMemDicomObject;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AttributeError {
    #[error("Missing attribute {0}")]
    Missing(&'static str),

    #[error("Invalid value for {name}: {source}")]
    Invalid {
        name: &'static str,
        #[source]
        source: ConvertValueError,
    },
}

fn invalid(name: &'static str) -> impl FnOnce(ConvertValueError) -> AttributeError {
    move |source| AttributeError::Invalid { name, source }
}

pub(crate) fn string(
    obj: &InMemDicomObject,
    tag: Tag,
    name: &'static str,
) -> Result<String, AttributeError> {
    let value = obj
        .get(tag)
        .ok_or(AttributeError::Missing(name))?
        .to_str()
        .map_err(invalid(name))?;
    Ok(value.trim_end_matches('\0').trim().to_owned())
}

pub(crate) fn opt_string(obj: &InMemDicomObject, tag: Tag) -> Option<String> {
    obj.get(tag)
        .and_then(|e| e.to_str().ok())
        .map(|s| s.trim_end_matches('\0').trim().to_owned())
}

pub(crate) fn float(
    obj: &InMemDicomObject,
    tag: Tag,
    name: &'static str,
) -> Result<f64, AttributeError> {
    obj.get(tag)
        .ok_or(AttributeError::Missing(name))?
        .to_float64()
        .map_err(invalid(name))
}

pub(crate) fn floats(
    obj: &InMemDicomObject,
    tag: Tag,
    name: &'static str,
) -> Result<Vec<f64>, AttributeError> {
    obj.get(tag)
        .ok_or(AttributeError::Missing(name))?
        .to_multi_float64()
        .map_err(invalid(name))
}

pub(crate) fn int(
    obj: &InMemDicomObject,
    tag: Tag,
    name: &'static str,
) -> Result<i32, AttributeError> {
    obj.get(tag)
        .ok_or(AttributeError::Missing(name))?
        .to_int::<i32>()
        .map_err(invalid(name))
}

/// Items of a sequence attribute, empty when the attribute is absent.
pub(crate) fn items(obj: &InMemDicomObject, tag: Tag) -> &[InMemDicomObject] {
    obj.get(tag).and_then(|e| e.items()).unwrap_or(&[])
}

pub(crate) fn put_uid(obj: &mut InMemDicomObject, tag: Tag, uid: &str) {
    obj.put(DataElement::new(tag, VR::UI, PrimitiveValue::from(uid)));
}

pub(crate) fn put_str(obj: &mut InMemDicomObject, tag: Tag, vr: VR, value: &str) {
    obj.put(DataElement::new(tag, vr, PrimitiveValue::from(value)));
}

pub(crate) fn put_sequence(obj: &mut InMemDicomObject, tag: Tag, items: Vec<InMemDicomObject>) {
    obj.put(DataElement::new(tag, VR::SQ, DataSetSequence::from(items)));
}
