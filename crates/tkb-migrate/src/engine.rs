//! Ordered replay of the historic event stream through configured
//! processors.
//!
//! The engine validates the input stream's ordering invariants, rewrites
//! every event in revision order, re-validates the output, and only then
//! surfaces it. Any violation aborts the whole run; partial migrations are
//! not a supported state.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use tracing::info;

use tkb_schema::SchemaRepository;
use tkb_store::{ChangeEvent, CommitRecord, KnowledgeStore, StoreIngest, StoreRecord};
use tkb_types::{BranchId, Revision, TypeName};

use crate::dedup::DuplicateAssociationCleanup;
use crate::error::MigrationError;
use crate::filter::TypeFilter;
use crate::indexer::Indexer;
use crate::retype::AssociationRetyper;
use crate::rewrite::{EventRewriter, RewriteAction, RewriteContext, RewriteStats};

/// One configured processor.
#[derive(Clone, Debug)]
pub enum ProcessorSpec {
    /// Remove repeated `(source, destination)` association creates.
    DropDuplicateAssociations { association_type: TypeName },
    /// Split an association type into narrower types by source item type.
    RetypeAssociationsBySourceType {
        association_type: TypeName,
        mapping: BTreeMap<TypeName, TypeName>,
    },
    /// Drop all events of the named types.
    ExcludeTypes { types: BTreeSet<TypeName> },
}

impl ProcessorSpec {
    fn build(&self) -> Box<dyn EventRewriter> {
        match self {
            ProcessorSpec::DropDuplicateAssociations { association_type } => {
                Box::new(DuplicateAssociationCleanup::new(association_type.clone()))
            }
            ProcessorSpec::RetypeAssociationsBySourceType {
                association_type,
                mapping,
            } => Box::new(AssociationRetyper::new(
                association_type.clone(),
                mapping.clone(),
            )),
            ProcessorSpec::ExcludeTypes { types } => Box::new(TypeFilter::new(types.clone())),
        }
    }
}

/// The processor chain of one migration run.
#[derive(Clone, Debug, Default)]
pub struct MigrationConfig {
    pub processors: Vec<ProcessorSpec>,
}

/// Administrative counters of one completed run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MigrationReport {
    pub records_in: u64,
    pub records_out: u64,
    pub events_in: u64,
    pub events_out: u64,
    pub adjusted: u64,
    pub deleted: u64,
}

impl MigrationReport {
    /// The administrative log line.
    pub fn summary(&self) -> String {
        format!(
            "adjusted {} association event(s). Deleted {} duplicate association(s).",
            self.adjusted, self.deleted
        )
    }
}

/// A fully validated rewritten stream plus its report.
#[derive(Debug)]
pub struct MigrationOutcome {
    pub records: Vec<StoreRecord>,
    pub report: MigrationReport,
}

/// One-shot migration engine. Consumed by the run, like the indexer it
/// carries.
pub struct MigrationEngine {
    schema: Arc<SchemaRepository>,
    indexer: Indexer,
}

impl MigrationEngine {
    /// An engine targeting the (possibly changed) schema the rewritten
    /// stream must conform to.
    pub fn new(schema: Arc<SchemaRepository>) -> Self {
        Self {
            schema,
            indexer: Indexer::new(),
        }
    }

    /// Attach pre-built secondary indexes for rewriters to consult.
    pub fn with_indexer(mut self, indexer: Indexer) -> Self {
        self.indexer = indexer;
        self
    }

    /// Run the configured processors over the stream.
    pub fn run(
        self,
        records: &[StoreRecord],
        config: &MigrationConfig,
    ) -> Result<MigrationOutcome, MigrationError> {
        let processors = config.processors.iter().map(ProcessorSpec::build).collect();
        self.run_with(records, processors)
    }

    /// Run a custom processor chain over the stream.
    pub fn run_with(
        self,
        records: &[StoreRecord],
        mut processors: Vec<Box<dyn EventRewriter>>,
    ) -> Result<MigrationOutcome, MigrationError> {
        validate_stream(records)?;

        let mut ctx = RewriteContext::new(Arc::clone(&self.schema)).with_indexer(self.indexer);
        let mut out = Vec::with_capacity(records.len());
        let mut events_in = 0u64;
        let mut events_out = 0u64;

        for record in records {
            match record {
                StoreRecord::Fork { .. } => out.push(record.clone()),
                StoreRecord::Commit(commit) => {
                    let mut rewritten = Vec::with_capacity(commit.events.len());
                    for event in &commit.events {
                        events_in += 1;
                        let mut current = vec![event.clone()];
                        for processor in processors.iter_mut() {
                            let mut next = Vec::new();
                            for event in current {
                                match processor.rewrite(event, &ctx)? {
                                    RewriteAction::Keep(event) => next.push(event),
                                    RewriteAction::Replace(events) => next.extend(events),
                                    RewriteAction::Drop => {}
                                }
                            }
                            current = next;
                            if current.is_empty() {
                                break;
                            }
                        }
                        rewritten.extend(current);
                    }

                    for event in &rewritten {
                        // Output types must resolve in the target schema.
                        match event {
                            ChangeEvent::AssociationCreated { type_name, .. } => {
                                ctx.schema().resolve_association_type(type_name)?;
                            }
                            _ => {
                                ctx.schema().resolve_type(event.type_name())?;
                            }
                        }
                        ctx.observe(event);
                        events_out += 1;
                    }

                    // A commit whose events were all dropped stays in the
                    // stream: revision numbering is part of history.
                    out.push(StoreRecord::Commit(CommitRecord {
                        branch: commit.branch,
                        revision: commit.revision,
                        info: commit.info.clone(),
                        events: rewritten,
                    }));
                }
            }
        }

        // Rewriters must preserve revision order and branch structure.
        validate_stream(&out)?;

        let stats = processors
            .iter()
            .map(|processor| processor.stats())
            .fold(RewriteStats::default(), |acc, stats| RewriteStats {
                adjusted: acc.adjusted + stats.adjusted,
                deleted: acc.deleted + stats.deleted,
            });

        let report = MigrationReport {
            records_in: records.len() as u64,
            records_out: out.len() as u64,
            events_in,
            events_out,
            adjusted: stats.adjusted,
            deleted: stats.deleted,
        };
        info!(
            adjusted = report.adjusted,
            deleted = report.deleted,
            events_in = report.events_in,
            events_out = report.events_out,
            "migration rewrite complete"
        );

        Ok(MigrationOutcome { records: out, report })
    }

    /// Run and ingest the rewritten stream into a sink, typically a fresh
    /// store.
    pub fn run_into<S: StoreIngest>(
        self,
        records: &[StoreRecord],
        config: &MigrationConfig,
        sink: &S,
    ) -> Result<MigrationReport, MigrationError> {
        let outcome = self.run(records, config)?;
        for record in &outcome.records {
            sink.apply(record)?;
        }
        Ok(outcome.report)
    }
}

/// Check a stream's ordering invariants: forks reference known parents at
/// or below their head, branches fork once, and commit revisions strictly
/// increase per branch.
pub fn validate_stream(records: &[StoreRecord]) -> Result<(), MigrationError> {
    let mut heads: HashMap<BranchId, Revision> =
        HashMap::from([(BranchId::TRUNK, Revision::INITIAL)]);

    for record in records {
        match record {
            StoreRecord::Fork {
                branch,
                parent,
                fork_revision,
            } => {
                let parent_head =
                    heads
                        .get(parent)
                        .copied()
                        .ok_or_else(|| MigrationError::InvariantViolation {
                            branch: *branch,
                            revision: *fork_revision,
                            reason: format!("fork from unknown parent {parent}"),
                        })?;
                if *fork_revision > parent_head {
                    return Err(MigrationError::InvariantViolation {
                        branch: *branch,
                        revision: *fork_revision,
                        reason: format!("fork above parent head {parent_head}"),
                    });
                }
                if heads.contains_key(branch) {
                    return Err(MigrationError::InvariantViolation {
                        branch: *branch,
                        revision: *fork_revision,
                        reason: "branch forked twice".to_string(),
                    });
                }
                heads.insert(*branch, *fork_revision);
            }
            StoreRecord::Commit(commit) => {
                let head = heads.get_mut(&commit.branch).ok_or_else(|| {
                    MigrationError::InvariantViolation {
                        branch: commit.branch,
                        revision: commit.revision,
                        reason: "commit on unknown branch".to_string(),
                    }
                })?;
                if commit.revision <= *head {
                    return Err(MigrationError::InvariantViolation {
                        branch: commit.branch,
                        revision: commit.revision,
                        reason: format!("revision not after head {head}"),
                    });
                }
                *head = commit.revision;
            }
        }
    }
    Ok(())
}

/// Administrative entry point: rewrite a source store's full history and
/// reconstruct it in a fresh store under the target schema.
pub fn run_migration(
    source: &KnowledgeStore,
    target_schema: Arc<SchemaRepository>,
    config: &MigrationConfig,
) -> Result<(KnowledgeStore, MigrationReport), MigrationError> {
    let records = source.records();
    let engine = MigrationEngine::new(Arc::clone(&target_schema));
    let target = KnowledgeStore::new(target_schema);
    let report = engine.run_into(&records, config, &target)?;
    info!("{}", report.summary());
    Ok((target, report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tkb_schema::{AttributeDef, SchemaBuilder, TypeDef, ValueType};
    use tkb_txn::KnowledgeBase;
    use tkb_types::{AttrValue, Attributes, ObjectId, ObjectKey, RevisionInfo, RevisionSpec};

    use crate::indexer::{IndexSpec, KeyMapping};

    fn schema() -> Arc<SchemaRepository> {
        Arc::new(
            SchemaBuilder::new()
                .with_type(TypeDef::item("Node"))
                .with_type(TypeDef::association("AB", "Node", "Node"))
                .build()
                .unwrap(),
        )
    }

    fn node(kb: &KnowledgeBase) -> ObjectId {
        let mut txn = kb.begin(BranchId::TRUNK).unwrap();
        let item = txn.create("Node", Attributes::new()).unwrap();
        kb.commit(txn).unwrap();
        item.id
    }

    /// Scenario: four `AB` associations from one source, two of which target
    /// the same destination, plus a historic delete of one non-duplicate
    /// edge. After migration exactly two distinct destinations remain.
    #[test]
    fn duplicate_cleanup_scenario() {
        let kb = KnowledgeBase::in_memory(schema());
        let a = node(&kb);
        let x = node(&kb);
        let y = node(&kb);
        let z = node(&kb);

        let mut txn = kb.begin(BranchId::TRUNK).unwrap();
        txn.link("AB", a, x, 0, Attributes::new()).unwrap();
        txn.link("AB", a, x, 1, Attributes::new()).unwrap();
        txn.link("AB", a, y, 2, Attributes::new()).unwrap();
        let z_edge = txn.link("AB", a, z, 3, Attributes::new()).unwrap();
        kb.commit(txn).unwrap();

        let mut txn = kb.begin(BranchId::TRUNK).unwrap();
        txn.unlink(&ObjectKey::current(BranchId::TRUNK, "AB", z_edge.id))
            .unwrap();
        kb.commit(txn).unwrap();

        let config = MigrationConfig {
            processors: vec![ProcessorSpec::DropDuplicateAssociations {
                association_type: "AB".into(),
            }],
        };
        let (migrated, report) = run_migration(kb.store(), schema(), &config).unwrap();

        assert_eq!(report.adjusted, 1);
        assert_eq!(report.deleted, 1);
        assert!(report.summary().contains("adjusted 1"));
        assert!(report.summary().contains("Deleted 1"));

        let edges = migrated
            .outgoing(&ObjectKey::current(BranchId::TRUNK, "Node", a), &"AB".into())
            .unwrap();
        let destinations: BTreeSet<ObjectId> =
            edges.iter().map(|edge| edge.destination).collect();
        assert_eq!(destinations, BTreeSet::from([x, y]));

        // Revision structure is preserved record-for-record.
        assert_eq!(
            migrated.head(BranchId::TRUNK).unwrap(),
            kb.store().head(BranchId::TRUNK).unwrap()
        );
    }

    /// A second run over already-migrated history adjusts nothing.
    #[test]
    fn duplicate_cleanup_is_idempotent() {
        let kb = KnowledgeBase::in_memory(schema());
        let a = node(&kb);
        let x = node(&kb);

        let mut txn = kb.begin(BranchId::TRUNK).unwrap();
        txn.link("AB", a, x, 0, Attributes::new()).unwrap();
        txn.link("AB", a, x, 1, Attributes::new()).unwrap();
        kb.commit(txn).unwrap();

        let config = MigrationConfig {
            processors: vec![ProcessorSpec::DropDuplicateAssociations {
                association_type: "AB".into(),
            }],
        };

        let (first, report) = run_migration(kb.store(), schema(), &config).unwrap();
        assert_eq!(report.adjusted, 1);

        let (_, second_report) = run_migration(&first, schema(), &config).unwrap();
        assert_eq!(second_report.adjusted, 0);
        assert_eq!(second_report.deleted, 0);
    }

    #[test]
    fn out_of_order_input_is_rejected() {
        let records = vec![
            StoreRecord::Commit(CommitRecord {
                branch: BranchId::TRUNK,
                revision: Revision::new(2),
                info: RevisionInfo::new("test"),
                events: vec![],
            }),
            StoreRecord::Commit(CommitRecord {
                branch: BranchId::TRUNK,
                revision: Revision::new(2),
                info: RevisionInfo::new("test"),
                events: vec![],
            }),
        ];
        let error = MigrationEngine::new(schema())
            .run(&records, &MigrationConfig::default())
            .unwrap_err();
        assert!(matches!(error, MigrationError::InvariantViolation { .. }));
    }

    #[test]
    fn fork_from_unknown_parent_is_rejected() {
        let records = vec![StoreRecord::Fork {
            branch: BranchId::new(2),
            parent: BranchId::new(9),
            fork_revision: Revision::INITIAL,
        }];
        let error = validate_stream(&records).unwrap_err();
        assert!(matches!(error, MigrationError::InvariantViolation { .. }));
    }

    #[test]
    fn rewritten_types_must_exist_in_target_schema() {
        let kb = KnowledgeBase::in_memory(schema());
        let a = node(&kb);
        let x = node(&kb);
        let mut txn = kb.begin(BranchId::TRUNK).unwrap();
        txn.link("AB", a, x, 0, Attributes::new()).unwrap();
        kb.commit(txn).unwrap();

        let mut mapping = BTreeMap::new();
        mapping.insert(TypeName::from("Node"), TypeName::from("narrowAB"));
        let config = MigrationConfig {
            processors: vec![ProcessorSpec::RetypeAssociationsBySourceType {
                association_type: "AB".into(),
                mapping,
            }],
        };

        // Target schema lacks the narrow type: the run must fail loudly.
        let error = run_migration(kb.store(), schema(), &config).unwrap_err();
        assert!(matches!(error, MigrationError::Schema(_)));

        // With the narrow type declared, the same run succeeds.
        let target = Arc::new(
            SchemaBuilder::new()
                .with_type(TypeDef::item("Node"))
                .with_type(TypeDef::association("AB", "Node", "Node"))
                .with_type(TypeDef::association("narrowAB", "Node", "Node"))
                .build()
                .unwrap(),
        );
        let (migrated, report) = run_migration(kb.store(), target, &config).unwrap();
        assert_eq!(report.adjusted, 1);
        let edges = migrated
            .outgoing(
                &ObjectKey::current(BranchId::TRUNK, "Node", a),
                &"narrowAB".into(),
            )
            .unwrap();
        assert_eq!(edges.len(), 1);
    }

    /// A custom rewriter resolving a secondary key through the run's
    /// indexer: accounts get their representative group attached by
    /// (case-insensitive) owner name.
    #[test]
    fn custom_rewriter_resolves_through_indexer() {
        let schema = Arc::new(
            SchemaBuilder::new()
                .with_type(
                    TypeDef::item("Person")
                        .with_attribute(AttributeDef::new("name", ValueType::Text))
                        .with_attribute(AttributeDef::new("group", ValueType::Id)),
                )
                .with_type(
                    TypeDef::item("Account")
                        .with_attribute(AttributeDef::new("owner", ValueType::Text))
                        .with_attribute(AttributeDef::new("group", ValueType::Id)),
                )
                .build()
                .unwrap(),
        );

        let kb = KnowledgeBase::in_memory(Arc::clone(&schema));
        let mut txn = kb.begin(BranchId::TRUNK).unwrap();
        let mut person = Attributes::new();
        person.insert("name".into(), AttrValue::Text("ada lovelace".into()));
        person.insert("group".into(), AttrValue::Id(ObjectId::new(500)));
        txn.create("Person", person).unwrap();
        let mut account = Attributes::new();
        account.insert("owner".into(), AttrValue::Text("Ada LOVELACE".into()));
        txn.create("Account", account).unwrap();
        kb.commit(txn).unwrap();

        let mut indexer = Indexer::new();
        indexer
            .register(
                "group-by-name",
                kb.store(),
                BranchId::TRUNK,
                RevisionSpec::Current,
                IndexSpec {
                    type_name: "Person".into(),
                    key_attributes: vec!["name".into()],
                    key_mappings: vec![KeyMapping::LowerCase],
                    value_attributes: vec!["group".into()],
                },
            )
            .unwrap();

        struct GroupResolver;
        impl EventRewriter for GroupResolver {
            fn rewrite(
                &mut self,
                event: ChangeEvent,
                ctx: &RewriteContext,
            ) -> Result<RewriteAction, MigrationError> {
                match event {
                    ChangeEvent::ItemCreated {
                        type_name,
                        id,
                        mut attributes,
                    } if type_name.as_str() == "Account" => {
                        let owner = attributes
                            .get("owner")
                            .cloned()
                            .expect("account without owner");
                        if let Some(value) = ctx.index("group-by-name")?.get_value(&[owner]) {
                            attributes.insert("group".into(), value[0].clone());
                        }
                        Ok(RewriteAction::Keep(ChangeEvent::ItemCreated {
                            type_name,
                            id,
                            attributes,
                        }))
                    }
                    other => Ok(RewriteAction::Keep(other)),
                }
            }
        }

        let outcome = MigrationEngine::new(Arc::clone(&schema))
            .with_indexer(indexer)
            .run_with(&kb.store().records(), vec![Box::new(GroupResolver)])
            .unwrap();

        let target = KnowledgeStore::new(schema);
        for record in &outcome.records {
            target.apply(record).unwrap();
        }

        let accounts = target
            .scan_items(BranchId::TRUNK, RevisionSpec::Current, &"Account".into())
            .unwrap();
        assert_eq!(accounts.len(), 1);
        assert_eq!(
            accounts[0].attribute("group").and_then(AttrValue::as_id),
            Some(ObjectId::new(500))
        );
    }

    #[test]
    fn report_summary_format() {
        let report = MigrationReport {
            adjusted: 3,
            deleted: 2,
            ..MigrationReport::default()
        };
        assert_eq!(
            report.summary(),
            "adjusted 3 association event(s). Deleted 2 duplicate association(s)."
        );
    }
}
