use serde::{Deserialize, Deserializer, Serialize};

/// Delimiter used to join `years` and `states` into one positional argument.
///
/// Individual values must not contain it; this is not re-checked.
pub const LIST_DELIMITER: char = ',';

/// Resolutions understood by the stock map generator.
///
/// The server does not restrict requests to this list; the generator owns
/// the final say on which resolutions it can render.
pub const KNOWN_RESOLUTIONS: [&str; 5] = [
    "Postcode",
    "StateElectorate",
    "FederalElectorate",
    "State",
    "National",
];

/// The filters a user picked: one geographic granularity plus the time
/// buckets and spatial subdivisions to include.
///
/// Missing or `null` fields deserialize to empty values so that
/// [`FilterSelection::validate`] is the single place that rejects them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterSelection {
    #[serde(default, deserialize_with = "null_as_default")]
    pub resolution: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub years: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub states: Vec<String>,
}

impl FilterSelection {
    pub fn new(
        resolution: impl Into<String>,
        years: impl IntoIterator<Item = impl Into<String>>,
        states: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            resolution: resolution.into(),
            years: years.into_iter().map(Into::into).collect(),
            states: states.into_iter().map(Into::into).collect(),
        }
    }

    /// Checks that every required field is present and non-empty.
    ///
    /// All missing fields are reported at once.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut missing = Vec::new();
        if self.resolution.trim().is_empty() {
            missing.push(Field::Resolution);
        }
        if self.years.is_empty() {
            missing.push(Field::Years);
        }
        if self.states.is_empty() {
            missing.push(Field::States);
        }

        if missing.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { missing })
        }
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }

    /// Positional arguments handed to the generator:
    /// `(resolution, years_joined, states_joined)`.
    pub fn to_args(&self) -> [String; 3] {
        [
            self.resolution.clone(),
            join_values(&self.years),
            join_values(&self.states),
        ]
    }
}

fn join_values(values: &[String]) -> String {
    let mut out = String::new();
    for (idx, value) in values.iter().enumerate() {
        if idx > 0 {
            out.push(LIST_DELIMITER);
        }
        out.push_str(value);
    }
    out
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Field {
    Resolution,
    Years,
    States,
}

impl Field {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Resolution => "resolution",
            Self::Years => "years",
            Self::States => "states",
        }
    }
}

/// A selection that is missing at least one required field.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("missing required parameters: {}", render_fields(.missing))]
pub struct ValidationError {
    pub missing: Vec<Field>,
}

fn render_fields(fields: &[Field]) -> String {
    fields
        .iter()
        .map(|f| f.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}
