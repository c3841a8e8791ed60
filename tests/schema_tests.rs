use aigrade::schema::response_schema;
use serde_json::Value;

fn objects(value: &Value, out: &mut Vec<Value>) {
    match value {
        Value::Object(map) => {
            if map.contains_key("properties") {
                out.push(value.clone());
            }
            map.values().for_each(|v| objects(v, out));
        }
        Value::Array(items) => items.iter().for_each(|v| objects(v, out)),
        _ => {}
    }
}

#[test]
fn every_object_is_closed_and_fully_required() {
    let schema = response_schema().expect("schema");
    let mut found = Vec::new();
    objects(&schema, &mut found);
    assert!(found.len() >= 7, "expected nested objects, found {}", found.len());

    for object in found {
        let mut properties: Vec<&String> =
            object["properties"].as_object().expect("properties").keys().collect();
        let mut required: Vec<&str> = object["required"]
            .as_array()
            .expect("required list")
            .iter()
            .filter_map(Value::as_str)
            .collect();
        properties.sort();
        required.sort();

        assert_eq!(object["additionalProperties"], Value::Bool(false));
        assert_eq!(
            properties.iter().map(|p| p.as_str()).collect::<Vec<_>>(),
            required
        );
    }
}

#[test]
fn schema_is_self_contained() {
    let text = response_schema().expect("schema").to_string();
    assert!(!text.contains("$ref"));
    assert!(!text.contains("$schema"));
    assert!(!text.contains("\"format\""));
    for status in ["\"pass\"", "\"fail\"", "\"uncertain\""] {
        assert!(text.contains(status), "missing {status}");
    }
}

#[test]
fn top_level_lists_all_report_fields() {
    let schema = response_schema().expect("schema");
    let properties = schema["properties"].as_object().expect("properties");
    for field in [
        "syntax_issues",
        "compilation",
        "logical_errors",
        "runtime_simulation",
        "requirement_assessments",
        "code_quality",
        "deductions",
        "extra_credit",
        "final_score",
        "overall_assessment",
        "improvement_suggestions",
        "comment_consideration",
    ] {
        assert!(properties.contains_key(field), "missing {field}");
    }
    assert_eq!(properties.len(), 12);
}
