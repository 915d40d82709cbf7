//! Extraction instruction prompt

/// Fields the model is asked to extract, in prompt order
pub const TARGET_FIELDS: [&str; 11] = [
    "Policy Number",
    "Claim Number",
    "Vehicle Number",
    "Insured Name",
    "Insured Mobile",
    "Insured Email",
    "Date of Accident",
    "Place of Accident",
    "Type of Loss",
    "Driver Name",
    "Driving License No",
];

/// Instruction sent alongside every document image
pub const EXTRACTION_PROMPT: &str = r#"
You are an intelligent document processing system.
Task: Extract ONLY the following relevant structured field data from this Motor Insurance Claim Form.

Instructions:
1. Extract ONLY these specific fields:
   - Policy Number
   - Claim Number
   - Vehicle Number
   - Insured Name
   - Insured Mobile
   - Insured Email
   - Date of Accident
   - Place of Accident
   - Type of Loss
   - Driver Name
   - Driving License No

2. IGNORE detailed address breakdowns, corporate office details, RTO names, and other minor checkboxes unless critical.
3. If one of the above requested fields is empty/blank, set "value": null.
4. "missing_fields" must list any of the above fields that are null.

Output JSON structure:
{
  "document_type": "Motor Insurance Claim Form",
  "fields": { "field_name": { "value": "string/null", "confidence": "high/medium/low" } },
  "missing_fields": ["field1"],
  "unrecognized_text": []
}
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_lists_every_target_field() {
        for field in TARGET_FIELDS {
            assert!(
                EXTRACTION_PROMPT.contains(&format!("- {}\n", field)),
                "prompt is missing {field}"
            );
        }
    }

    #[test]
    fn test_prompt_states_null_rules() {
        assert!(EXTRACTION_PROMPT.contains(r#"set "value": null"#));
        assert!(EXTRACTION_PROMPT.contains(r#""missing_fields" must list"#));
    }
}
