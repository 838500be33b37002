//! SOQL validation for read-only access.
//!
//! Everything here runs before a query leaves the process. Only SELECT
//! statements pass; DML keywords, unbounded COUNT queries, and statement
//! chaining are rejected with a message suitable for showing to the caller.

use lazy_static::lazy_static;
use regex::Regex;

use crate::error::ClientError;

lazy_static! {
    // Word boundaries keep field names like CreatedDate or IsDeleted legal.
    static ref FORBIDDEN_OPERATION: Regex = Regex::new(
        r"\b(INSERT|UPDATE|DELETE|UPSERT|MERGE|UNDELETE|CREATE|MODIFY|TRUNCATE)\b"
    )
    .expect("forbidden operation pattern");
    static ref COUNT_CALL: Regex =
        Regex::new(r"COUNT\s*\(([^)]*)\)").expect("count pattern");
    static ref STATEMENT_CHAIN: Regex =
        Regex::new(r";\s*\w+").expect("statement chain pattern");
}

/// Validate a SOQL query against the read-only rules.
pub fn validate(soql: &str) -> Result<(), ClientError> {
    let upper = soql.trim().to_uppercase();

    if !upper.starts_with("SELECT") {
        return Err(ClientError::InvalidQuery(
            "Only SELECT queries are allowed. DML operations are not permitted.".to_string(),
        ));
    }

    if let Some(captures) = FORBIDDEN_OPERATION.captures(&upper) {
        let operation = &captures[1];
        return Err(ClientError::InvalidQuery(format!(
            "{operation} operations are not permitted. Only SELECT queries are allowed."
        )));
    }

    if let Some(captures) = COUNT_CALL.captures(&upper) {
        if captures[1].trim().is_empty() {
            return Err(ClientError::InvalidQuery(
                "COUNT queries must specify a field to count (e.g., COUNT(Id))".to_string(),
            ));
        }
        if !upper.contains("WHERE") {
            return Err(ClientError::InvalidQuery(
                "COUNT queries must include a WHERE clause for performance reasons".to_string(),
            ));
        }
    }

    // Original casing: a trailing bare semicolon is harmless, chaining isn't.
    if STATEMENT_CHAIN.is_match(soql) {
        return Err(ClientError::InvalidQuery(
            "Multiple SQL statements are not allowed".to_string(),
        ));
    }

    Ok(())
}

/// Append `LIMIT 200` to plain SELECTs that specify neither a LIMIT nor an
/// aggregate COUNT.
pub fn apply_row_limit(soql: &str) -> String {
    let upper = soql.to_uppercase();
    if upper.contains("LIMIT") || upper.contains("COUNT(") {
        soql.to_string()
    } else {
        format!("{} LIMIT 200", soql.trim_end())
    }
}
