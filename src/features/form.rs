//! Mapping from the answers a person picks in the intake form to the encoded
//! integers the classifier was trained on.

use serde::{Deserialize, Serialize};

use super::vector::FeatureVector;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("unknown choice '{value}' for {field}")]
pub struct UnknownChoice {
    pub field: &'static str,
    pub value: String,
}

/// Form answers as submitted. Categorical fields carry the visible choice
/// text; numeric fields carry the slider value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormAnswers {
    pub age: f64,
    pub sex: String,
    pub chest_pain_type: String,
    pub bp: f64,
    pub cholesterol: f64,
    pub fbs_over_120: String,
    pub ekg_results: String,
    pub max_hr: f64,
    pub exercise_angina: String,
    pub st_depression: f64,
    pub slope_of_st: String,
    pub number_of_vessels_fluro: f64,
    pub thallium: String,
}

impl FormAnswers {
    pub fn to_feature_vector(&self) -> Result<FeatureVector, UnknownChoice> {
        Ok(FeatureVector {
            age: self.age,
            sex: lookup("sex", &self.sex, SEX)?,
            chest_pain_type: lookup("chest_pain_type", &self.chest_pain_type, CHEST_PAIN)?,
            bp: self.bp,
            cholesterol: self.cholesterol,
            fbs_over_120: lookup("fbs_over_120", &self.fbs_over_120, YES_NO)?,
            ekg_results: lookup("ekg_results", &self.ekg_results, EKG)?,
            max_hr: self.max_hr,
            exercise_angina: lookup("exercise_angina", &self.exercise_angina, YES_NO)?,
            st_depression: self.st_depression,
            slope_of_st: lookup("slope_of_st", &self.slope_of_st, SLOPE)?,
            number_of_vessels_fluro: self.number_of_vessels_fluro,
            thallium: lookup("thallium", &self.thallium, THALLIUM)?,
        })
    }
}

// Indonesian form labels and their English equivalents.
const SEX: &[(&str, f64)] = &[
    ("wanita", 0.0),
    ("female", 0.0),
    ("pria", 1.0),
    ("male", 1.0),
];

const YES_NO: &[(&str, f64)] = &[("tidak", 0.0), ("no", 0.0), ("ya", 1.0), ("yes", 1.0)];

const CHEST_PAIN: &[(&str, f64)] = &[
    ("typical angina", 1.0),
    ("atypical angina", 2.0),
    ("non-anginal pain", 3.0),
    ("asymptomatic", 4.0),
];

const EKG: &[(&str, f64)] = &[
    ("normal", 0.0),
    ("abnormalitas st-t", 1.0),
    ("st-t abnormality", 1.0),
    ("hipertrofi ventrikel kiri", 2.0),
    ("left ventricular hypertrophy", 2.0),
];

const SLOPE: &[(&str, f64)] = &[("upsloping", 1.0), ("flat", 2.0), ("downsloping", 3.0)];

const THALLIUM: &[(&str, f64)] = &[
    ("normal", 3.0),
    ("fixed defect", 6.0),
    ("reversible defect", 7.0),
];

fn lookup(field: &'static str, value: &str, table: &[(&str, f64)]) -> Result<f64, UnknownChoice> {
    let needle = value.trim().to_lowercase();
    table
        .iter()
        .find(|(choice, _)| *choice == needle)
        .map(|(_, code)| *code)
        .ok_or_else(|| UnknownChoice {
            field,
            value: value.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn answers() -> FormAnswers {
        FormAnswers {
            age: 65.0,
            sex: "Pria".into(),
            chest_pain_type: "Asymptomatic".into(),
            bp: 155.0,
            cholesterol: 280.0,
            fbs_over_120: "Ya".into(),
            ekg_results: "Hipertrofi Ventrikel Kiri".into(),
            max_hr: 120.0,
            exercise_angina: "Ya".into(),
            st_depression: 2.5,
            slope_of_st: "Flat".into(),
            number_of_vessels_fluro: 2.0,
            thallium: "Reversible Defect".into(),
        }
    }

    #[test]
    fn maps_categorical_answers_to_codes() {
        let vector = answers().to_feature_vector().unwrap();
        assert_eq!(vector.sex, 1.0);
        assert_eq!(vector.chest_pain_type, 4.0);
        assert_eq!(vector.fbs_over_120, 1.0);
        assert_eq!(vector.ekg_results, 2.0);
        assert_eq!(vector.slope_of_st, 2.0);
        assert_eq!(vector.thallium, 7.0);
        assert_eq!(vector.age, 65.0);
    }

    #[test]
    fn thallium_and_ekg_share_the_normal_label_with_different_codes() {
        let mut form = answers();
        form.ekg_results = "Normal".into();
        form.thallium = "normal".into();
        let vector = form.to_feature_vector().unwrap();
        assert_eq!(vector.ekg_results, 0.0);
        assert_eq!(vector.thallium, 3.0);
    }

    #[test]
    fn rejects_unknown_choice() {
        let mut form = answers();
        form.slope_of_st = "Sideways".into();
        let err = form.to_feature_vector().unwrap_err();
        assert_eq!(err.field, "slope_of_st");
        assert_eq!(err.value, "Sideways");
    }
}
