//! String-or-array field support.

use serde::{Deserialize, Deserializer};

/// Deserialize either a single value or an array of values into a `Vec`.
pub(crate) fn deserialize<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Listable<T> {
        One(T),
        Many(Vec<T>),
    }

    Ok(match Listable::deserialize(deserializer)? {
        Listable::One(value) => vec![value],
        Listable::Many(values) => values,
    })
}
