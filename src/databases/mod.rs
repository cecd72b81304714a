//! Database targets.

pub mod dry_run;
pub mod sqlite;

use crate::descriptor::BenchmarkDescriptor;

/// Insert/select/update/delete workload on the `Generic` table, addressed by iteration index.
///
/// `table` is the fully qualified table name for the target.
pub fn generic_workload(table: &str) -> Vec<BenchmarkDescriptor> {
    vec![
        BenchmarkDescriptor::looped(
            "inserts",
            format!(
                "INSERT INTO {table} (GenericId, Name, Balance, Description) VALUES ({{{{.Iter}}}}, '{{{{call .RandString 3 10}}}}', {{{{call .RandInt63n 9999999999}}}}, '{{{{call .RandString 0 100}}}}');"
            ),
        ),
        BenchmarkDescriptor::looped(
            "selects",
            format!("SELECT * FROM {table} WHERE GenericId = {{{{.Iter}}}};"),
        ),
        BenchmarkDescriptor::looped(
            "updates",
            format!(
                "UPDATE {table} SET Name = '{{{{call .RandString 3 10}}}}', Balance = {{{{call .RandInt63n 9999999999}}}} WHERE GenericId = {{{{.Iter}}}};"
            ),
        ),
        BenchmarkDescriptor::looped(
            "deletes",
            format!("DELETE FROM {table} WHERE GenericId = {{{{.Iter}}}};"),
        ),
    ]
}
