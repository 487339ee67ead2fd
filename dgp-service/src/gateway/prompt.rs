use crate::models::PatientDetails;

/// Instruction sent next to the fingerprint frame
pub fn build_analysis_prompt(patient: &PatientDetails) -> String {
    let father_name = if patient.father_name.trim().is_empty() {
        "not provided"
    } else {
        patient.father_name.as_str()
    };

    format!(
        r#"You are preparing a dermatoglyphic pattern (DGP) report for a medical demonstration tool.
The attached image is a fingerprint scan, or a simulated placeholder scan.

Patient:
- Name: {name}
- Father's name: {father_name}
- Age: {age}
- Gender: {gender}
- Contact: {contact}

Using the image:
1. Classify the dominant ridge pattern as one of Loop, Whorl, Arch or Composite. If the image is a placeholder, pick the pattern a statistical demonstration would most likely show.
2. Predict the most likely ABO blood group with Rh factor (for example "O+").
3. Give a confidence score between 70 and 98 reflecting pattern clarity.
4. Give a probability breakdown across the likely blood groups, in percent, summing to about 100.
5. Explain the finding in two or three sentences of professional clinical language.
6. Generate a unique report identifier in the form DGP-<year>-<number>.

Respond with a single JSON object only, following the provided schema. Set "detected" to false only if the image is corrupt or holds no fingerprint."#,
        name = patient.full_name.trim(),
        father_name = father_name.trim(),
        age = patient.age.trim(),
        gender = patient.gender,
        contact = patient.contact_number.trim(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Gender;

    #[test]
    fn prompt_carries_every_patient_field() {
        let patient = PatientDetails {
            full_name: "Jane Doe".to_string(),
            father_name: "Richard Doe".to_string(),
            age: "30".to_string(),
            gender: Gender::Female,
            contact_number: "555-1111".to_string(),
        };
        let prompt = build_analysis_prompt(&patient);

        for expected in [
            "Name: Jane Doe",
            "Father's name: Richard Doe",
            "Age: 30",
            "Gender: Female",
            "Contact: 555-1111",
            "Loop, Whorl, Arch or Composite",
        ] {
            assert!(prompt.contains(expected), "missing {expected:?}");
        }
    }

    #[test]
    fn blank_father_name_is_spelled_out() {
        let patient = PatientDetails {
            full_name: "Sam Roe".to_string(),
            father_name: "  ".to_string(),
            age: "41".to_string(),
            gender: Gender::Other,
            contact_number: "555-2222".to_string(),
        };
        assert!(build_analysis_prompt(&patient).contains("Father's name: not provided"));
    }
}
