use serde::{Deserialize, Serialize};

/// The thirteen raw inputs the classifier is trained on, in model column order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Feature {
    Age,
    Sex,
    ChestPainType,
    Bp,
    Cholesterol,
    FbsOver120,
    EkgResults,
    MaxHr,
    ExerciseAngina,
    StDepression,
    SlopeOfSt,
    NumberOfVesselsFluro,
    Thallium,
}

pub const FEATURE_COUNT: usize = 13;

impl Feature {
    pub const ALL: [Feature; FEATURE_COUNT] = [
        Feature::Age,
        Feature::Sex,
        Feature::ChestPainType,
        Feature::Bp,
        Feature::Cholesterol,
        Feature::FbsOver120,
        Feature::EkgResults,
        Feature::MaxHr,
        Feature::ExerciseAngina,
        Feature::StDepression,
        Feature::SlopeOfSt,
        Feature::NumberOfVesselsFluro,
        Feature::Thallium,
    ];

    /// Column header used by the datasets and the prediction API.
    pub fn column_name(&self) -> &'static str {
        match self {
            Feature::Age => "Age",
            Feature::Sex => "Sex",
            Feature::ChestPainType => "Chest pain type",
            Feature::Bp => "BP",
            Feature::Cholesterol => "Cholesterol",
            Feature::FbsOver120 => "FBS over 120",
            Feature::EkgResults => "EKG results",
            Feature::MaxHr => "Max HR",
            Feature::ExerciseAngina => "Exercise angina",
            Feature::StDepression => "ST depression",
            Feature::SlopeOfSt => "Slope of ST",
            Feature::NumberOfVesselsFluro => "Number of vessels fluro",
            Feature::Thallium => "Thallium",
        }
    }

    /// Label value used in the metrics exposition.
    pub fn metric_name(&self) -> &'static str {
        match self {
            Feature::Age => "age",
            Feature::Sex => "sex",
            Feature::ChestPainType => "chest_pain_type",
            Feature::Bp => "bp",
            Feature::Cholesterol => "cholesterol",
            Feature::FbsOver120 => "fbs_over_120",
            Feature::EkgResults => "ekg_results",
            Feature::MaxHr => "max_hr",
            Feature::ExerciseAngina => "exercise_angina",
            Feature::StDepression => "st_depression",
            Feature::SlopeOfSt => "slope_of_st",
            Feature::NumberOfVesselsFluro => "number_of_vessels_fluro",
            Feature::Thallium => "thallium",
        }
    }

    pub fn index(&self) -> usize {
        *self as usize
    }

    pub fn from_column_name(name: &str) -> Option<Feature> {
        Feature::ALL
            .iter()
            .copied()
            .find(|feature| feature.column_name() == name.trim())
    }
}

/// Raw, pre-preprocessing inputs for one patient. Deserialization fails unless
/// every column is present.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    #[serde(rename = "Age")]
    pub age: f64,
    #[serde(rename = "Sex")]
    pub sex: f64,
    #[serde(rename = "Chest pain type")]
    pub chest_pain_type: f64,
    #[serde(rename = "BP")]
    pub bp: f64,
    #[serde(rename = "Cholesterol")]
    pub cholesterol: f64,
    #[serde(rename = "FBS over 120")]
    pub fbs_over_120: f64,
    #[serde(rename = "EKG results")]
    pub ekg_results: f64,
    #[serde(rename = "Max HR")]
    pub max_hr: f64,
    #[serde(rename = "Exercise angina")]
    pub exercise_angina: f64,
    #[serde(rename = "ST depression")]
    pub st_depression: f64,
    #[serde(rename = "Slope of ST")]
    pub slope_of_st: f64,
    #[serde(rename = "Number of vessels fluro")]
    pub number_of_vessels_fluro: f64,
    #[serde(rename = "Thallium")]
    pub thallium: f64,
}

impl FeatureVector {
    pub fn from_values(values: [f64; FEATURE_COUNT]) -> Self {
        Self {
            age: values[0],
            sex: values[1],
            chest_pain_type: values[2],
            bp: values[3],
            cholesterol: values[4],
            fbs_over_120: values[5],
            ekg_results: values[6],
            max_hr: values[7],
            exercise_angina: values[8],
            st_depression: values[9],
            slope_of_st: values[10],
            number_of_vessels_fluro: values[11],
            thallium: values[12],
        }
    }

    /// Values in model column order.
    pub fn values(&self) -> [f64; FEATURE_COUNT] {
        [
            self.age,
            self.sex,
            self.chest_pain_type,
            self.bp,
            self.cholesterol,
            self.fbs_over_120,
            self.ekg_results,
            self.max_hr,
            self.exercise_angina,
            self.st_depression,
            self.slope_of_st,
            self.number_of_vessels_fluro,
            self.thallium,
        ]
    }

    pub fn get(&self, feature: Feature) -> f64 {
        self.values()[feature.index()]
    }

    pub fn iter(&self) -> impl Iterator<Item = (Feature, f64)> {
        Feature::ALL.into_iter().zip(self.values())
    }
}

/// Binary outcome of the classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskLabel {
    Presence,
    Absence,
}

impl RiskLabel {
    pub fn from_class(class: u8) -> Self {
        if class == 1 {
            RiskLabel::Presence
        } else {
            RiskLabel::Absence
        }
    }

    /// Dataset encoding, matching the `Heart Disease` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLabel::Presence => "Presence",
            RiskLabel::Absence => "Absence",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "Presence" | "1" => Some(RiskLabel::Presence),
            "Absence" | "0" => Some(RiskLabel::Absence),
            _ => None,
        }
    }

    /// Text shown to the person filling in the form.
    pub fn display_text(&self) -> &'static str {
        match self {
            RiskLabel::Presence => "Berisiko Tinggi (Presence)",
            RiskLabel::Absence => "Berisiko Rendah (Absence)",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feature_order_matches_vector_layout() {
        for (position, feature) in Feature::ALL.iter().enumerate() {
            assert_eq!(feature.index(), position);
        }
        let vector = FeatureVector::from_values([
            1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0, 11.0, 12.0, 13.0,
        ]);
        assert_eq!(vector.get(Feature::Thallium), 13.0);
        assert_eq!(vector.get(Feature::StDepression), 10.0);
    }

    #[test]
    fn deserialize_requires_every_column() {
        let json = r#"{"Age": 52, "Sex": 1}"#;
        assert!(serde_json::from_str::<FeatureVector>(json).is_err());
    }

    #[test]
    fn deserialize_uses_dataset_column_names() {
        let json = r#"{
            "Age": 52, "Sex": 1, "Chest pain type": 1, "BP": 125, "Cholesterol": 212,
            "FBS over 120": 0, "EKG results": 0, "Max HR": 168, "Exercise angina": 0,
            "ST depression": 1.0, "Slope of ST": 1, "Number of vessels fluro": 2, "Thallium": 7
        }"#;
        let vector: FeatureVector = serde_json::from_str(json).unwrap();
        assert_eq!(vector.max_hr, 168.0);
        assert_eq!(vector.get(Feature::NumberOfVesselsFluro), 2.0);
    }

    #[test]
    fn column_names_round_trip() {
        assert_eq!(
            Feature::from_column_name(" Chest pain type "),
            Some(Feature::ChestPainType)
        );
        assert_eq!(Feature::from_column_name("Heart Disease"), None);
    }
}
