// SPDX-License-Identifier: MIT OR Apache-2.0
//! Database schema.
//!
//! All timestamps are RFC 3339 UTC text; all amounts are decimal text.
//! `audit_events` and `progress_events` are append-only; nothing in this
//! crate updates or deletes them.

pub(crate) const DDL: &str = r#"
CREATE TABLE IF NOT EXISTS packages (
    package_id          TEXT PRIMARY KEY,
    feedlot_family      TEXT NOT NULL,
    status              TEXT NOT NULL DEFAULT 'STARTED',
    document_refs       TEXT NOT NULL DEFAULT '[]',
    statement_ref       TEXT,
    total_invoices      INTEGER NOT NULL DEFAULT 0,
    extracted_invoices  INTEGER NOT NULL DEFAULT 0,
    created_at          TEXT NOT NULL,
    updated_at          TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS invoices (
    package_id      TEXT NOT NULL REFERENCES packages(package_id),
    invoice_number  TEXT NOT NULL,
    lot_number      TEXT,
    invoice_date    TEXT,
    total_amount    TEXT,
    status          TEXT NOT NULL DEFAULT 'EXTRACTED',
    invoice_ref     TEXT NOT NULL,
    validation_ref  TEXT,
    created_at      TEXT NOT NULL,
    updated_at      TEXT NOT NULL,
    PRIMARY KEY (package_id, invoice_number)
);

CREATE TABLE IF NOT EXISTS progress_events (
    package_id  TEXT NOT NULL REFERENCES packages(package_id),
    ordinal     INTEGER NOT NULL,
    step        TEXT NOT NULL,
    message     TEXT NOT NULL,
    created_at  TEXT NOT NULL,
    PRIMARY KEY (package_id, ordinal)
);

CREATE TABLE IF NOT EXISTS audit_events (
    event_id        TEXT PRIMARY KEY,
    timestamp       TEXT NOT NULL,
    kind            TEXT NOT NULL,
    severity        TEXT NOT NULL,
    package_id      TEXT,
    invoice_number  TEXT,
    workflow_id     TEXT,
    activity_name   TEXT,
    message         TEXT NOT NULL,
    details         TEXT NOT NULL DEFAULT '{}',
    actor           TEXT NOT NULL,
    artifact_refs   TEXT NOT NULL DEFAULT '[]'
);
CREATE INDEX IF NOT EXISTS idx_audit_package ON audit_events(package_id, timestamp);

CREATE TABLE IF NOT EXISTS entity_profiles (
    entity_id           TEXT PRIMARY KEY,
    entity_code         TEXT NOT NULL,
    name                TEXT NOT NULL,
    aliases             TEXT NOT NULL DEFAULT '[]',
    default_dimensions  TEXT NOT NULL DEFAULT '{}',
    is_active           INTEGER NOT NULL DEFAULT 1
);

CREATE TABLE IF NOT EXISTS routing_keys (
    key_type    TEXT NOT NULL,
    key_value   TEXT NOT NULL,
    entity_id   TEXT NOT NULL REFERENCES entity_profiles(entity_id),
    confidence  TEXT NOT NULL,
    priority    INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (key_type, key_value, entity_id)
);
-- Hard keys are authoritative: one entity per (key_type, key_value).
CREATE UNIQUE INDEX IF NOT EXISTS idx_routing_hard
    ON routing_keys(key_type, key_value) WHERE confidence = 'HARD';

CREATE TABLE IF NOT EXISTS vendor_aliases (
    customer_id       TEXT NOT NULL,
    entity_id         TEXT NOT NULL,
    alias_normalized  TEXT NOT NULL,
    alias_original    TEXT NOT NULL,
    vendor_id         TEXT NOT NULL,
    vendor_number     TEXT NOT NULL,
    vendor_name       TEXT NOT NULL,
    created_by        TEXT NOT NULL,
    created_at        TEXT NOT NULL,
    PRIMARY KEY (customer_id, entity_id, alias_normalized)
);

CREATE TABLE IF NOT EXISTS gl_mappings (
    level           TEXT NOT NULL,
    entity_id       TEXT,
    vendor_id       TEXT,
    category        TEXT NOT NULL,
    gl_account_ref  TEXT NOT NULL,
    UNIQUE (level, entity_id, vendor_id, category)
);

CREATE TABLE IF NOT EXISTS dimension_rules (
    entity_id         TEXT,
    dimension_code    TEXT NOT NULL,
    source_field      TEXT NOT NULL,
    transform         TEXT NOT NULL DEFAULT 'none',
    transform_params  TEXT NOT NULL DEFAULT '{}',
    default_value     TEXT,
    is_required       INTEGER NOT NULL DEFAULT 0,
    UNIQUE (entity_id, dimension_code)
);

CREATE TABLE IF NOT EXISTS workflow_executions (
    workflow_id    TEXT PRIMARY KEY,
    workflow_type  TEXT NOT NULL,
    input          TEXT NOT NULL,
    status         TEXT NOT NULL DEFAULT 'RUNNING',
    result         TEXT,
    error          TEXT,
    created_at     TEXT NOT NULL,
    updated_at     TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS activity_executions (
    workflow_id        TEXT NOT NULL REFERENCES workflow_executions(workflow_id),
    seq                INTEGER NOT NULL,
    activity_name      TEXT NOT NULL,
    status             TEXT NOT NULL,
    attempts           INTEGER NOT NULL DEFAULT 0,
    result             TEXT,
    error_code         TEXT,
    error_message      TEXT,
    last_heartbeat_at  TEXT,
    created_at         TEXT NOT NULL,
    updated_at         TEXT NOT NULL,
    PRIMARY KEY (workflow_id, seq)
);
"#;
