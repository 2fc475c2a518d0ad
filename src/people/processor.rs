use anyhow::Result;
use async_trait::async_trait;
use tracing::debug;

use super::Person;
use crate::item::ItemProcessor;

/// Upper-cases both names. Rows with no name at all are skipped.
#[derive(Debug, Clone, Copy, Default)]
pub struct UppercaseProcessor;

#[async_trait]
impl ItemProcessor<Person, Person> for UppercaseProcessor {
    async fn process(&self, person: &Person) -> Result<Option<Person>> {
        if person.first_name.is_empty() && person.last_name.is_empty() {
            debug!("skipping blank row");
            return Ok(None);
        }
        let transformed = Person::new(
            person.first_name.to_uppercase(),
            person.last_name.to_uppercase(),
        );
        debug!(from = %person, to = %transformed, "converting person");
        Ok(Some(transformed))
    }
}
