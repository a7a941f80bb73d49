use crate::application::use_cases::attribute_extraction::{
    extract_attributes, extract_bin, extract_inn,
};
use crate::domain::entity::{
    EntitySource, NormalizedEntityRecord, RawEntityRecord, ShardRef, UnifiedEntity,
};
use crate::domain::project::{ClientProject, DataShard};

/// Shapes a shard record, filling identifiers and contacts from its
/// attribute blob.
pub fn raw_to_unified(
    record: RawEntityRecord,
    project: &ClientProject,
    shard: &DataShard,
) -> UnifiedEntity {
    let extracted = record
        .attributes
        .as_deref()
        .map(extract_attributes)
        .unwrap_or_default();

    let mut tax_id = extracted.inn;
    let mut bin = extracted.bin;

    // No identifier in the blob: look in code, then reference, then name
    if tax_id.is_none() && bin.is_none() {
        let fallbacks = [
            record.code.as_deref(),
            Some(record.reference.as_str()),
            Some(record.name.as_str()),
        ];
        for text in fallbacks.into_iter().flatten() {
            if let Some(inn) = extract_inn(text) {
                tax_id = Some(inn);
                break;
            }
            if let Some(found) = extract_bin(text) {
                bin = Some(found);
                break;
            }
        }
    }
    if tax_id.is_none() {
        tax_id = bin.clone();
    }

    let shards = vec![ShardRef {
        shard_id: shard.id,
        shard_name: shard.name.clone(),
        source_reference: Some(record.reference.clone()),
        source_name: Some(record.name.clone()),
    }];

    UnifiedEntity {
        id: record.id,
        source: EntitySource::Raw,
        name: record.name,
        project_id: project.id,
        project_name: project.name.clone(),
        shard_id: Some(shard.id),
        shard_name: Some(shard.name.clone()),
        reference: Some(record.reference),
        code: record.code,
        attributes: record.attributes,
        normalized_name: None,
        source_name: None,
        source_reference: None,
        tax_id,
        kpp: extracted.kpp,
        bin,
        legal_address: extracted.address.clone(),
        postal_address: extracted.address,
        contact_phone: extracted.phone,
        contact_email: extracted.email,
        contact_person: extracted.contact_person,
        quality_score: None,
        shards,
    }
}

pub fn normalized_to_unified(record: NormalizedEntityRecord, project: &ClientProject) -> UnifiedEntity {
    let tax_id = record.tax_id.or_else(|| record.bin.clone());
    let (shard_id, shard_name) = match record.shards.first() {
        Some(first) => (Some(first.shard_id), Some(first.shard_name.clone())),
        None => (None, None),
    };

    UnifiedEntity {
        id: record.id,
        source: EntitySource::Normalized,
        name: record.normalized_name.clone(),
        project_id: project.id,
        project_name: project.name.clone(),
        shard_id,
        shard_name,
        reference: None,
        code: None,
        attributes: None,
        normalized_name: Some(record.normalized_name),
        source_name: record.source_name,
        source_reference: record.source_reference,
        tax_id,
        kpp: record.kpp,
        bin: record.bin,
        legal_address: record.legal_address,
        postal_address: record.postal_address,
        contact_phone: record.contact_phone,
        contact_email: record.contact_email,
        contact_person: record.contact_person,
        quality_score: record.quality_score,
        shards: record.shards,
    }
}
