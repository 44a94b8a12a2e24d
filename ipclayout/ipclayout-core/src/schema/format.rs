use std::fmt::{Error, Write as _};

use super::Field;

/// Format fields one per line:
/// `name: { type: int32, nullable: true }`. Dictionary-encoded fields show
/// index and value types plus the dictionary id.
pub fn format_schema(fields: impl AsRef<[Field]>) -> Result<String, Error> {
    let mut out = String::new();
    for field in fields.as_ref() {
        match field.dictionary {
            Some(encoding) => writeln!(
                out,
                "{}: {{ type: dictionary<{}, {}>, nullable: {}, dictionary: {}{} }}",
                field.name,
                encoding.index_type.type_name(),
                field.data_type.type_name(),
                field.nullable,
                encoding.id,
                if encoding.ordered { ", ordered: true" } else { "" },
            )?,
            None => writeln!(
                out,
                "{}: {{ type: {}, nullable: {} }}",
                field.name,
                field.data_type.type_name(),
                field.nullable
            )?,
        }
    }
    Ok(out)
}
