use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use super::xfdf::{self, XfdfPayload};
use super::{
    Annotation, AnnotationFlag, AnnotationFlagChange, AnnotationRef, AnnotationSet, FieldFlag,
    FieldInput, FieldValue, FormField, PropertyValue,
};
use crate::error::{BatchReport, BridgeError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// No full-state command has been received yet.
    Uninitialized,
    Synced,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOrigin {
    InitialLoad,
    Incremental,
}

/// One change command, numbered in arrival order.
#[derive(Debug, Clone)]
pub struct AnnotationCommand {
    pub sequence: u64,
    pub origin: CommandOrigin,
    pub payload: XfdfPayload,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExportOptions {
    /// Restricts the export to these annotations.
    pub annot_list: Option<Vec<AnnotationRef>>,
    pub form_fields_only: bool,
}

#[derive(Debug, Clone)]
enum ChannelEntry {
    Upsert(Annotation),
    Deleted,
}

/// Annotation state of one session.
///
/// The document layer holds what was loaded with the document plus direct
/// edits. The channel layer holds what the host pushed through annotation
/// commands; a full resynchronization replaces only the channel layer.
#[derive(Debug)]
pub struct AnnotationSync {
    state: SyncState,
    document: AnnotationSet,
    channel: BTreeMap<String, ChannelEntry>,
    next_sequence: u64,
}

impl Default for AnnotationSync {
    fn default() -> Self {
        Self::new(AnnotationSet::default())
    }
}

impl AnnotationSync {
    pub fn new(document: AnnotationSet) -> Self {
        Self {
            state: SyncState::Uninitialized,
            document,
            channel: BTreeMap::new(),
            next_sequence: 1,
        }
    }

    /// Seeds the document layer from XFDF persisted with the document.
    pub fn from_document_xfdf(xfdf: &str) -> Result<Self> {
        let payload = xfdf::parse(xfdf)?;
        let mut document = AnnotationSet::default();
        for (name, value) in payload.fields {
            document
                .fields
                .insert(name.clone(), FormField::new(name, value));
        }
        for annotation in payload.add.into_iter().chain(payload.modify) {
            document.insert(annotation);
        }
        Ok(Self::new(document))
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    /// Number of commands applied so far.
    pub fn commands_applied(&self) -> u64 {
        self.next_sequence - 1
    }

    /// Parses and applies one command. A payload that fails to parse leaves
    /// the store untouched and consumes no sequence number.
    #[instrument(skip(self, xfdf), fields(len = xfdf.len()))]
    pub fn receive(&mut self, xfdf: &str, initial_load: bool) -> Result<AnnotationCommand> {
        let payload = xfdf::parse(xfdf)?;
        let origin = if initial_load {
            CommandOrigin::InitialLoad
        } else {
            CommandOrigin::Incremental
        };
        let command = AnnotationCommand {
            sequence: self.next_sequence,
            origin,
            payload,
        };
        self.next_sequence += 1;
        self.apply(&command);
        Ok(command)
    }

    /// Full-state import, same as an initial-load command.
    pub fn import(&mut self, xfdf: &str) -> Result<AnnotationCommand> {
        self.receive(xfdf, true)
    }

    fn apply(&mut self, command: &AnnotationCommand) {
        match command.origin {
            CommandOrigin::InitialLoad => {
                debug!(
                    sequence = command.sequence,
                    discarded = self.channel.len(),
                    "full annotation resynchronization"
                );
                self.channel.clear();
                self.state = SyncState::Synced;
            }
            CommandOrigin::Incremental => {
                if self.state == SyncState::Uninitialized {
                    debug!(
                        sequence = command.sequence,
                        "incremental command before initial load"
                    );
                }
            }
        }

        let payload = &command.payload;
        for (name, value) in &payload.fields {
            match self.document.fields.get_mut(name) {
                Some(field) => field.value = value.clone(),
                None => {
                    self.document
                        .fields
                        .insert(name.clone(), FormField::new(name.clone(), value.clone()));
                }
            }
        }
        for annotation in payload.add.iter().chain(&payload.modify) {
            self.channel
                .insert(annotation.id.clone(), ChannelEntry::Upsert(annotation.clone()));
        }
        for reference in &payload.delete {
            if self.document.annotations.contains_key(&reference.id) {
                self.channel
                    .insert(reference.id.clone(), ChannelEntry::Deleted);
            } else {
                self.channel.remove(&reference.id);
            }
        }
    }

    pub fn get(&self, id: &str) -> Option<&Annotation> {
        match self.channel.get(id) {
            Some(ChannelEntry::Upsert(annotation)) => Some(annotation),
            Some(ChannelEntry::Deleted) => None,
            None => self.document.annotations.get(id),
        }
    }

    fn get_mut(&mut self, id: &str) -> Option<&mut Annotation> {
        match self.channel.get_mut(id) {
            Some(ChannelEntry::Upsert(annotation)) => Some(annotation),
            Some(ChannelEntry::Deleted) => None,
            None => self.document.annotations.get_mut(id),
        }
    }

    /// The annotation set the host currently sees.
    pub fn visible(&self) -> AnnotationSet {
        let mut visible = self.document.clone();
        for (id, entry) in &self.channel {
            match entry {
                ChannelEntry::Upsert(annotation) => {
                    visible.annotations.insert(id.clone(), annotation.clone());
                }
                ChannelEntry::Deleted => {
                    visible.annotations.remove(id);
                }
            }
        }
        visible
    }

    pub fn field(&self, name: &str) -> Option<&FormField> {
        self.document.fields.get(name)
    }

    pub fn export(&self, options: &ExportOptions) -> Result<String> {
        let visible = self.visible();
        let fields = visible.fields.values();
        if options.form_fields_only {
            return xfdf::write_document(fields, std::iter::empty());
        }
        let annotations = visible.ordered().into_iter().filter(|annotation| {
            options
                .annot_list
                .as_ref()
                .map_or(true, |list| list.iter().any(|r| r.matches(annotation)))
        });
        xfdf::write_document(fields, annotations)
    }

    /// Removes the referenced annotations from both layers. Unknown ids are
    /// skipped. Returns how many were removed.
    pub fn delete(&mut self, references: &[AnnotationRef]) -> usize {
        let mut removed = 0;
        for reference in references {
            let matches = self
                .get(&reference.id)
                .is_some_and(|annotation| reference.matches(annotation));
            if !matches {
                debug!(id = %reference.id, "delete skipped unknown annotation");
                continue;
            }
            self.document.annotations.remove(&reference.id);
            self.channel.remove(&reference.id);
            removed += 1;
        }
        removed
    }

    /// Annotations [`AnnotationSync::flatten`] would remove, in page order.
    pub fn flatten_targets(&self, forms_only: bool) -> Vec<Annotation> {
        self.visible()
            .ordered()
            .into_iter()
            .filter(|annotation| !forms_only || annotation.is_widget())
            .cloned()
            .collect()
    }

    /// Drops annotations whose appearance the engine has baked into page
    /// content. With `forms_only`, only widgets go; either way every form
    /// field stops being addressable. Returns the removed annotations.
    pub fn flatten(&mut self, forms_only: bool) -> Vec<Annotation> {
        let targets = self.flatten_targets(forms_only);
        for annotation in &targets {
            self.document.annotations.remove(&annotation.id);
            self.channel.remove(&annotation.id);
        }
        self.document.fields.clear();
        targets
    }

    /// Looks up an annotation the host addressed by id and page.
    pub fn locate(&self, id: &str, page: usize) -> Result<&Annotation> {
        let annotation = self
            .get(id)
            .ok_or_else(|| BridgeError::invalid_argument(id, "no such annotation"))?;
        if annotation.page != page {
            return Err(BridgeError::invalid_argument(
                id,
                format!("annotation is on page {}, not {}", annotation.page, page),
            ));
        }
        Ok(annotation)
    }

    /// Applies every valid property; invalid entries are reported and
    /// skipped.
    pub fn set_properties(
        &mut self,
        id: &str,
        page: usize,
        properties: &BTreeMap<String, PropertyValue>,
    ) -> Result<BatchReport> {
        self.locate(id, page)?;
        let mut report = BatchReport::default();
        let Some(annotation) = self.get_mut(id) else {
            return Ok(report);
        };
        for (key, value) in properties {
            match apply_property(annotation, key, value) {
                Ok(()) => report.applied.push(key.clone()),
                Err(err) => report.rejected.push(err),
            }
        }
        Ok(report)
    }

    pub fn set_flags(&mut self, changes: &[AnnotationFlagChange]) -> BatchReport {
        let mut report = BatchReport::default();
        for change in changes {
            let flag = match change.flag.parse::<AnnotationFlag>() {
                Ok(flag) => flag,
                Err(_) => {
                    report.rejected.push(BridgeError::invalid_argument(
                        change.id.as_str(),
                        format!("unknown annotation flag `{}`", change.flag),
                    ));
                    continue;
                }
            };
            if let Err(err) = self.locate(&change.id, change.page_number) {
                report.rejected.push(err);
                continue;
            }
            let Some(annotation) = self.get_mut(&change.id) else {
                continue;
            };
            if change.flag_value {
                annotation.flags.insert(flag);
            } else {
                annotation.flags.remove(&flag);
            }
            report.applied.push(change.id.clone());
        }
        report
    }

    pub fn set_field_flags(&mut self, names: &[String], flag: FieldFlag, value: bool) -> BatchReport {
        let mut report = BatchReport::default();
        for name in names {
            let Some(field) = self.document.fields.get_mut(name) else {
                report
                    .rejected
                    .push(BridgeError::invalid_argument(name.as_str(), "no such field"));
                continue;
            };
            match flag {
                FieldFlag::ReadOnly => field.read_only = value,
                FieldFlag::Required => field.required = value,
            }
            report.applied.push(name.clone());
        }
        report
    }

    pub fn set_field_values(&mut self, values: &BTreeMap<String, FieldInput>) -> BatchReport {
        let mut report = BatchReport::default();
        for (name, input) in values {
            let Some(field) = self.document.fields.get_mut(name) else {
                report
                    .rejected
                    .push(BridgeError::invalid_argument(name.as_str(), "no such field"));
                continue;
            };
            if field.read_only {
                report
                    .rejected
                    .push(BridgeError::invalid_argument(name.as_str(), "field is read-only"));
                continue;
            }
            match coerce_field_value(&field.value, input) {
                Some(value) => {
                    field.value = value;
                    report.applied.push(name.clone());
                }
                None => report.rejected.push(BridgeError::invalid_argument(
                    name.as_str(),
                    format!("{} does not fit a {} field", input, field_kind(&field.value)),
                )),
            }
        }
        report
    }
}

fn field_kind(value: &FieldValue) -> &'static str {
    match value {
        FieldValue::Checked(_) => "checkbox",
        FieldValue::Text(_) => "text",
    }
}

fn coerce_field_value(current: &FieldValue, input: &FieldInput) -> Option<FieldValue> {
    match (current, input) {
        (FieldValue::Checked(_), FieldInput::Bool(checked)) => Some(FieldValue::Checked(*checked)),
        (FieldValue::Text(_), FieldInput::Text(text)) => Some(FieldValue::Text(text.clone())),
        (FieldValue::Text(_), FieldInput::Number(number)) => {
            Some(FieldValue::Text(format_number(*number)?))
        }
        _ => None,
    }
}

fn format_number(number: f64) -> Option<String> {
    if !number.is_finite() {
        return None;
    }
    if number.fract() == 0.0 && number.abs() < 1e15 {
        Some(format!("{}", number as i64))
    } else {
        Some(number.to_string())
    }
}

fn apply_property(annotation: &mut Annotation, key: &str, value: &PropertyValue) -> Result<()> {
    let reject = |reason: &str| Err(BridgeError::invalid_argument(key, reason));
    match (key, value) {
        ("contents", PropertyValue::Text(text)) => annotation.contents = Some(text.clone()),
        ("subject", PropertyValue::Text(text)) => annotation.subject = Some(text.clone()),
        ("title", PropertyValue::Text(text)) => annotation.title = Some(text.clone()),
        ("color", PropertyValue::Text(color)) => {
            if !is_hex_color(color) {
                return reject("expected a #RRGGBB color");
            }
            annotation.color = Some(color.to_ascii_uppercase());
        }
        ("rect", PropertyValue::Rect(rect)) => {
            if !rect.is_finite() {
                return reject("rectangle coordinates must be finite");
            }
            annotation.rect = *rect;
        }
        ("contents" | "subject" | "title" | "color", _) => return reject("expected text"),
        ("rect", _) => return reject("expected a rectangle"),
        _ => return reject("unsupported annotation property"),
    }
    Ok(())
}

fn is_hex_color(raw: &str) -> bool {
    raw.len() == 7
        && raw.starts_with('#')
        && raw[1..].chars().all(|c| c.is_ascii_hexdigit())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotations::Rect;

    fn square(id: &str, page: usize) -> Annotation {
        Annotation::new(id, "square", page, Rect::new(0.0, 0.0, 10.0, 10.0))
    }

    fn document_with(annotations: &[Annotation]) -> AnnotationSet {
        let mut set = AnnotationSet::default();
        for annotation in annotations {
            set.insert(annotation.clone());
        }
        set.fields.insert(
            "name".into(),
            FormField::new("name", FieldValue::Text(String::new())),
        );
        set.fields
            .insert("agree".into(), FormField::new("agree", FieldValue::Checked(false)));
        set
    }

    fn ids(sync: &AnnotationSync) -> Vec<String> {
        sync.visible()
            .ordered()
            .iter()
            .map(|a| a.id.clone())
            .collect()
    }

    const LOAD_AB: &str = r#"<xfdf><add>
        <square name="a" page="0" rect="0,0,1,1"/>
        <square name="b" page="1" rect="0,0,1,1"/>
    </add></xfdf>"#;

    #[test]
    fn initial_load_moves_to_synced() {
        let mut sync = AnnotationSync::default();
        assert_eq!(sync.state(), SyncState::Uninitialized);

        let command = sync.receive(LOAD_AB, true).unwrap();
        assert_eq!(command.sequence, 1);
        assert_eq!(command.origin, CommandOrigin::InitialLoad);
        assert_eq!(sync.state(), SyncState::Synced);
        assert_eq!(ids(&sync), ["a", "b"]);
    }

    #[test]
    fn incremental_commands_apply_in_arrival_order() {
        let mut sync = AnnotationSync::default();
        sync.receive(LOAD_AB, true).unwrap();
        sync.receive(
            r#"<xfdf><modify><square name="a" page="0" rect="5,5,6,6"/></modify></xfdf>"#,
            false,
        )
        .unwrap();
        sync.receive(r#"<xfdf><delete><id>b</id></delete></xfdf>"#, false)
            .unwrap();
        sync.receive(
            r#"<xfdf><add><circle name="c" page="2" rect="0,0,1,1"/></add></xfdf>"#,
            false,
        )
        .unwrap();

        assert_eq!(sync.commands_applied(), 4);
        assert_eq!(ids(&sync), ["a", "c"]);
        assert_eq!(sync.get("a").unwrap().rect, Rect::new(5.0, 5.0, 6.0, 6.0));
    }

    #[test]
    fn oversized_page_commands_fail_without_consuming_a_sequence() {
        let mut sync = AnnotationSync::default();
        sync.receive(LOAD_AB, true).unwrap();
        let add = format!(
            r#"<xfdf><add><square name="x" page="{}" rect="0,0,1,1"/></add></xfdf>"#,
            usize::MAX
        );

        let err = sync.receive(&add, false).unwrap_err();
        assert!(matches!(err, BridgeError::InvalidArgument { .. }));
        assert_eq!(sync.commands_applied(), 1);
        assert_eq!(ids(&sync), ["a", "b"]);
    }

    #[test]
    fn order_of_delivery_decides_the_outcome() {
        let add = r#"<xfdf><add><square name="x" page="0" rect="0,0,1,1"/></add></xfdf>"#;
        let delete = r#"<xfdf><delete><id>x</id></delete></xfdf>"#;

        let mut forward = AnnotationSync::default();
        forward.receive(LOAD_AB, true).unwrap();
        forward.receive(add, false).unwrap();
        forward.receive(delete, false).unwrap();

        let mut reversed = AnnotationSync::default();
        reversed.receive(LOAD_AB, true).unwrap();
        reversed.receive(delete, false).unwrap();
        reversed.receive(add, false).unwrap();

        assert!(forward.get("x").is_none());
        assert!(reversed.get("x").is_some());
    }

    #[test]
    fn resync_discards_channel_state_but_keeps_document_annotations() {
        let mut sync = AnnotationSync::new(document_with(&[square("doc", 1)]));
        sync.receive(LOAD_AB, true).unwrap();
        sync.receive(r#"<xfdf><delete><id>doc</id></delete></xfdf>"#, false)
            .unwrap();
        assert_eq!(ids(&sync), ["a", "b"]);

        sync.receive(
            r#"<xfdf><add><square name="z" page="0" rect="0,0,1,1"/></add></xfdf>"#,
            true,
        )
        .unwrap();
        assert_eq!(sync.state(), SyncState::Synced);
        assert_eq!(ids(&sync), ["doc", "z"]);
    }

    #[test]
    fn incremental_before_initial_load_stays_uninitialized() {
        let mut sync = AnnotationSync::default();
        sync.receive(
            r#"<xfdf><add><square name="early" page="0" rect="0,0,1,1"/></add></xfdf>"#,
            false,
        )
        .unwrap();
        assert_eq!(sync.state(), SyncState::Uninitialized);
        assert!(sync.get("early").is_some());
    }

    #[test]
    fn malformed_commands_change_nothing() {
        let mut sync = AnnotationSync::default();
        sync.receive(LOAD_AB, true).unwrap();
        let err = sync.receive("<xfdf><add>", false).unwrap_err();
        assert!(matches!(err, BridgeError::InvalidArgument { .. }));
        assert_eq!(sync.commands_applied(), 1);
        assert_eq!(ids(&sync), ["a", "b"]);
    }

    #[test]
    fn export_then_import_preserves_the_visible_set() {
        let mut sync = AnnotationSync::new(document_with(&[square("doc", 3)]));
        sync.receive(LOAD_AB, true).unwrap();
        let before = sync.visible();

        let exported = sync.export(&ExportOptions::default()).unwrap();
        sync.import(&exported).unwrap();

        assert_eq!(sync.visible(), before);
    }

    #[test]
    fn export_filters_by_reference_and_fields_only() {
        let mut sync = AnnotationSync::new(document_with(&[]));
        sync.receive(LOAD_AB, true).unwrap();

        let only_b = sync
            .export(&ExportOptions {
                annot_list: Some(vec![AnnotationRef::new("b")]),
                form_fields_only: false,
            })
            .unwrap();
        let parsed = xfdf::parse(&only_b).unwrap();
        assert_eq!(parsed.add.len(), 1);
        assert_eq!(parsed.add[0].id, "b");

        let fields_only = sync
            .export(&ExportOptions {
                annot_list: None,
                form_fields_only: true,
            })
            .unwrap();
        let parsed = xfdf::parse(&fields_only).unwrap();
        assert!(parsed.add.is_empty());
        assert_eq!(parsed.fields.len(), 2);
    }

    #[test]
    fn delete_ignores_unknown_ids() {
        let mut sync = AnnotationSync::new(document_with(&[square("doc", 1)]));
        sync.receive(LOAD_AB, true).unwrap();
        let removed = sync.delete(&[
            AnnotationRef::new("missing"),
            AnnotationRef::new("a"),
            AnnotationRef::new("doc"),
            AnnotationRef {
                id: "b".into(),
                page_number: Some(9),
            },
        ]);
        assert_eq!(removed, 2);
        assert_eq!(ids(&sync), ["b"]);

        // Direct deletes are not undone by a resync.
        sync.import("<xfdf/>").unwrap();
        assert!(sync.get("doc").is_none());
    }

    #[test]
    fn flatten_forms_only_keeps_markup_annotations() {
        let mut widget = square("w", 1);
        widget.subtype = "widget".into();
        widget.field = Some("name".into());
        let mut sync = AnnotationSync::new(document_with(&[widget, square("s", 1)]));

        let targets: Vec<String> = sync.flatten_targets(true).into_iter().map(|a| a.id).collect();
        assert_eq!(targets, ["w"]);

        let flattened = sync.flatten(true);
        assert_eq!(flattened.len(), 1);
        assert_eq!(flattened[0].id, "w");
        assert!(sync.get("w").is_none());
        assert!(sync.get("s").is_some());
        assert!(sync.field("name").is_none());

        assert_eq!(sync.flatten(false).len(), 1);
        assert!(sync.visible().annotations.is_empty());
        assert!(sync.flatten(false).is_empty());
    }

    #[test]
    fn property_batches_apply_valid_entries() {
        let mut sync = AnnotationSync::new(document_with(&[square("s", 2)]));
        let properties = BTreeMap::from([
            ("contents".to_string(), PropertyValue::Text("hello".into())),
            ("color".to_string(), PropertyValue::Text("#00ff00".into())),
            ("rect".to_string(), PropertyValue::Text("nope".into())),
            ("opacity".to_string(), PropertyValue::Number(0.5)),
        ]);

        let report = sync.set_properties("s", 2, &properties).unwrap();
        assert_eq!(report.applied, ["color", "contents"]);
        assert_eq!(report.rejected.len(), 2);

        let annotation = sync.get("s").unwrap();
        assert_eq!(annotation.contents.as_deref(), Some("hello"));
        assert_eq!(annotation.color.as_deref(), Some("#00FF00"));
        assert_eq!(annotation.rect, Rect::new(0.0, 0.0, 10.0, 10.0));

        assert!(sync.set_properties("s", 1, &properties).is_err());
        assert!(sync.set_properties("ghost", 2, &properties).is_err());
    }

    #[test]
    fn flag_batches_report_each_bad_entry() {
        let mut sync = AnnotationSync::new(document_with(&[square("s", 1)]));
        let change = |id: &str, flag: &str, value: bool| AnnotationFlagChange {
            id: id.into(),
            page_number: 1,
            flag: flag.into(),
            flag_value: value,
        };

        let report = sync.set_flags(&[
            change("s", "hidden", true),
            change("s", "sparkly", true),
            change("ghost", "locked", true),
            change("s", "print", true),
            change("s", "print", false),
        ]);
        assert_eq!(report.applied.len(), 3);
        assert_eq!(report.rejected.len(), 2);

        let flags = &sync.get("s").unwrap().flags;
        assert!(flags.contains(&AnnotationFlag::Hidden));
        assert!(!flags.contains(&AnnotationFlag::Print));
    }

    #[test]
    fn field_values_are_type_checked_per_entry() {
        let mut sync = AnnotationSync::new(document_with(&[]));
        sync.set_field_flags(&["agree".to_string()], FieldFlag::Required, true);

        let values = BTreeMap::from([
            ("name".to_string(), FieldInput::Number(42.0)),
            ("agree".to_string(), FieldInput::Text("yes".into())),
            ("missing".to_string(), FieldInput::Bool(true)),
        ]);
        let report = sync.set_field_values(&values);
        assert_eq!(report.applied, ["name"]);
        assert_eq!(report.rejected.len(), 2);
        assert_eq!(
            sync.field("name").unwrap().value,
            FieldValue::Text("42".into())
        );
        assert!(sync.field("agree").unwrap().required);

        let report = sync.set_field_flags(
            &["name".to_string(), "nope".to_string()],
            FieldFlag::ReadOnly,
            true,
        );
        assert_eq!(report.applied, ["name"]);
        assert_eq!(report.rejected.len(), 1);

        let report = sync.set_field_values(&BTreeMap::from([(
            "name".to_string(),
            FieldInput::Text("locked out".into()),
        )]));
        assert!(report.applied.is_empty());
        assert_eq!(
            sync.field("name").unwrap().value,
            FieldValue::Text("42".into())
        );
    }

    #[test]
    fn persisted_xfdf_seeds_the_document_layer() {
        let mut sync = AnnotationSync::from_document_xfdf(
            r#"<xfdf><fields><field name="name"><value>Ada</value></field></fields>
            <annots><square name="p" page="0" rect="0,0,1,1"/></annots></xfdf>"#,
        )
        .unwrap();
        assert_eq!(sync.state(), SyncState::Uninitialized);
        assert_eq!(ids(&sync), ["p"]);
        assert_eq!(sync.field("name").unwrap().value, FieldValue::Text("Ada".into()));

        sync.receive(LOAD_AB, true).unwrap();
        assert_eq!(ids(&sync), ["a", "p", "b"]);
        assert!(AnnotationSync::from_document_xfdf("<notxfdf/>").is_err());
    }
}
