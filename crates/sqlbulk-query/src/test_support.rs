//! Shared fixtures for builder tests.

use asupersync::Outcome;
use sqlbulk_core::EntityProfile;

#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct Customer {
    pub id: i64,
    pub email: String,
    pub name: String,
    pub tier: i32,
    pub region_id: Option<i64>,
}

/// `"sales"."customer"`: auto-generated integer key read back after
/// insert, unique email, one inlined integer and one nullable column.
pub(crate) fn customer_profile() -> EntityProfile<Customer> {
    let mut b = EntityProfile::<Customer>::builder();
    b.table(None, Some("sales")).unwrap();
    b.property("id", |c| c.id, |c, v| c.id = v)
        .unwrap()
        .private_key()
        .auto_generated()
        .updated_after_insert();
    b.property("email", |c| c.email.clone(), |c, v| c.email = v)
        .unwrap()
        .unique();
    b.property("name", |c| c.name.clone(), |c, v| c.name = v)
        .unwrap();
    b.property("tier", |c| c.tier, |c, v| c.tier = v).unwrap();
    b.property("regionId", |c| c.region_id, |c, v| c.region_id = v)
        .unwrap();
    b.build().unwrap()
}

pub(crate) fn customers(n: usize) -> Vec<Customer> {
    (0..n)
        .map(|i| Customer {
            id: 0,
            email: format!("c{i}@example.com"),
            name: format!("Customer {i}"),
            tier: i32::try_from(i % 1000).unwrap(),
            region_id: None,
        })
        .collect()
}

pub(crate) fn unwrap_outcome<T: std::fmt::Debug>(
    outcome: Outcome<T, crate::SqlGenerationError>,
) -> T {
    match outcome {
        Outcome::Ok(value) => value,
        Outcome::Err(err) => panic!("unexpected error: {err}"),
        Outcome::Cancelled(reason) => panic!("cancelled: {reason:?}"),
        Outcome::Panicked(payload) => panic!("panicked: {payload:?}"),
    }
}
