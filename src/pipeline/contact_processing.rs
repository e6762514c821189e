//! Contact scoring step.
//!
//! 1. Load every pending contact
//! 2. Validate contacts in parallel (one oracle call each)
//! 3. Delete every loaded contact, whatever the outcome
//! 4. Merge accepted contacts, grouped per identity so that a
//!    registration is only ever touched by one worker

use std::collections::BTreeMap;

use rayon::prelude::*;

use crate::error::RobertResult;
use crate::log_info;
use crate::metrics::BatchMetrics;
use crate::scoring::ExposureAggregator;
use crate::storage::{ContactRepository, PermanentIdentifier, RegistrationRepository};
use crate::validation::{
    ContactOutcome, ContactValidation, ContactValidator, DiscardReason, ValidatedContact,
};

use super::context::BatchContext;

/// Result of one contact scoring pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContactProcessingReport {
    pub processed: usize,
    pub accepted: usize,
    pub discarded: usize,
    pub registrations_updated: usize,
    pub scores_appended: usize,
}

pub struct ContactProcessor {
    validator: ContactValidator,
    aggregator: ExposureAggregator,
}

impl ContactProcessor {
    pub fn new(validator: ContactValidator, aggregator: ExposureAggregator) -> Self {
        Self {
            validator,
            aggregator,
        }
    }

    /// Process every pending contact.
    ///
    /// Contacts are consumed before their exposures are merged: a store
    /// failure during the merge loses the contact rather than scoring it
    /// twice on the next run.
    pub fn process_all(
        &self,
        contacts: &dyn ContactRepository,
        registrations: &dyn RegistrationRepository,
        ctx: &BatchContext,
        metrics: &BatchMetrics,
    ) -> RobertResult<ContactProcessingReport> {
        let pending = contacts.find_all()?;
        let log_ctx = ctx.log_context();

        let validations: Vec<ContactValidation> = pending
            .par_iter()
            .map(|contact| self.validator.validate(contact, &log_ctx))
            .collect();

        for contact in &pending {
            contacts.delete(&contact.id)?;
        }

        let mut report = ContactProcessingReport {
            processed: validations.len(),
            ..Default::default()
        };
        let mut by_identity: BTreeMap<PermanentIdentifier, Vec<ValidatedContact>> = BTreeMap::new();
        for validation in validations {
            metrics.record_validation(&validation);
            match validation.outcome {
                ContactOutcome::Accepted(accepted) => {
                    by_identity
                        .entry(accepted.permanent_identifier.clone())
                        .or_default()
                        .push(accepted);
                }
                ContactOutcome::Discarded(_) => report.discarded += 1,
            }
        }

        let merged: Vec<MergeOutcome> = by_identity
            .into_par_iter()
            .map(|(id, accepted)| self.merge_identity(&id, &accepted, registrations, ctx, metrics))
            .collect::<RobertResult<_>>()?;

        for outcome in merged {
            match outcome {
                MergeOutcome::Merged { contacts, scores } => {
                    report.accepted += contacts;
                    report.scores_appended += scores;
                    report.registrations_updated += 1;
                }
                MergeOutcome::UnknownIdentity { contacts } => report.discarded += contacts,
            }
        }
        Ok(report)
    }

    fn merge_identity(
        &self,
        id: &PermanentIdentifier,
        accepted: &[ValidatedContact],
        registrations: &dyn RegistrationRepository,
        ctx: &BatchContext,
        metrics: &BatchMetrics,
    ) -> RobertResult<MergeOutcome> {
        let Some(mut registration) = registrations.find_by_id(id)? else {
            for contact in accepted {
                let log_ctx = ctx.contact_context(&contact.contact_id);
                log_info!(log_ctx, "CONTACT_DISCARDED", reason = DiscardReason::UnknownIdentity);
                metrics.record_late_discard(DiscardReason::UnknownIdentity);
            }
            return Ok(MergeOutcome::UnknownIdentity {
                contacts: accepted.len(),
            });
        };

        let mut scores = 0;
        for contact in accepted {
            let appended = self.aggregator.merge(&mut registration, &contact.messages)?;
            let log_ctx = ctx.contact_context(&contact.contact_id);
            log_info!(
                log_ctx,
                "CONTACT_SCORED",
                registration = id.fingerprint(),
                messages = contact.messages.len(),
                scores = appended
            );
            scores += appended;
        }
        metrics.record_scores(scores);
        registrations.save(registration)?;

        Ok(MergeOutcome::Merged {
            contacts: accepted.len(),
            scores,
        })
    }
}

enum MergeOutcome {
    Merged { contacts: usize, scores: usize },
    UnknownIdentity { contacts: usize },
}
