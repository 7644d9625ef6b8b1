use anyhow::Result;
use serde_json::Value;

/// Add up a list of JSON numbers.
///
/// Integers stay integers as long as every input is one; otherwise the sum
/// is computed as a float.
pub fn sum_numbers(values: &[Value]) -> Result<Value> {
    let mut int_sum: i64 = 0;
    let mut float_sum: f64 = 0.0;
    let mut all_ints = true;

    for value in values {
        match value {
            Value::Number(n) if n.is_i64() && all_ints => {
                let n = n.as_i64().unwrap_or_default();
                int_sum = int_sum
                    .checked_add(n)
                    .ok_or_else(|| anyhow::anyhow!("integer overflow while summing"))?;
                float_sum += n as f64;
            }
            Value::Number(n) => {
                all_ints = false;
                float_sum += n
                    .as_f64()
                    .ok_or_else(|| anyhow::anyhow!("number {n} is not representable"))?;
            }
            other => return Err(anyhow::anyhow!("expected a number, got {other}")),
        }
    }

    if all_ints {
        Ok(Value::from(int_sum))
    } else {
        Ok(Value::from(float_sum))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sums_integers_as_integers() {
        assert_eq!(sum_numbers(&[json!(1), json!(2), json!(3)]).unwrap(), json!(6));
    }

    #[test]
    fn mixed_numbers_become_floats() {
        assert_eq!(sum_numbers(&[json!(1), json!(0.5)]).unwrap(), json!(1.5));
    }

    #[test]
    fn rejects_non_numbers() {
        assert!(sum_numbers(&[json!("x")]).is_err());
    }
}
