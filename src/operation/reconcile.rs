
use crate::{
    bson::{Bson, Document},
    bson_util,
    error::{
        parse_error_message,
        IndexedWriteConcernError,
        IndexedWriteError,
        ReplyError,
        BAD_VALUE_CODE,
        UNKNOWN_ERROR_CODE,
    },
    operation::{BatchIndexMap, RawReply, ReplyFieldNames, ReplyVariant},
    results::WriteResult,
};

/// Folds the replies to the batches of one write into a single [`WriteResult`].
///
/// `replies[i]` must be the reply to the batch described by `index_maps[i]`, and replies must be
/// given in the order their batches were issued. Every index in the result refers to the caller's
/// original document array, whatever the number of batches.
///
/// When `acknowledged` is `false` the replies are ignored and an empty, unacknowledged result is
/// returned.
///
/// Reconciliation never fails: a reply that cannot be interpreted is recorded in
/// [`WriteResult::reply_errors`] and the remaining replies are still folded.
pub fn reconcile(
    replies: &[RawReply],
    index_maps: &[BatchIndexMap],
    variant: ReplyVariant,
    acknowledged: bool,
    fields: &ReplyFieldNames,
) -> WriteResult {
    if !acknowledged {
        return WriteResult::unacknowledged();
    }

    let mut reconciler = Reconciler {
        fields,
        result: WriteResult {
            acknowledged: true,
            ..Default::default()
        },
    };

    for (batch, reply) in replies.iter().enumerate() {
        match index_maps.get(batch) {
            Some(index_map) => reconciler.fold(batch, reply.document(), index_map, variant),
            None => reconciler.reply_error(batch, "no index map was provided for this reply"),
        }
    }
    for batch in replies.len()..index_maps.len() {
        reconciler.reply_error(batch, "no reply was provided for this batch");
    }

    reconciler.finish()
}

struct Reconciler<'a> {
    fields: &'a ReplyFieldNames,
    result: WriteResult,
}

impl Reconciler<'_> {
    fn fold(
        &mut self,
        batch: usize,
        reply: &Document,
        index_map: &BatchIndexMap,
        variant: ReplyVariant,
    ) {
        if variant == ReplyVariant::Modern {
            if let Some(ok) = reply.get(&self.fields.ok) {
                if !bson_util::is_ok(ok) {
                    let message = parse_error_message(reply, self.fields).unwrap_or_default();
                    self.reply_error(batch, format!("the write command failed: {message}"));
                    return;
                }
            }
        }

        self.add_count(batch, reply);

        match variant {
            ReplyVariant::Modern => {
                self.collect_write_errors(batch, reply, index_map);
                self.collect_write_concern_errors(batch, reply, index_map);
            }
            ReplyVariant::Legacy => self.collect_legacy_error(batch, reply, index_map),
        }
    }

    fn add_count(&mut self, batch: usize, reply: &Document) {
        match reply.get(&self.fields.count).map(bson_util::get_u64) {
            Some(Some(count)) => match self.result.affected_count.checked_add(count) {
                Some(total) => self.result.affected_count = total,
                None => self.reply_error(
                    batch,
                    format!("the `{}` count overflows the affected total", self.fields.count),
                ),
            },
            Some(None) => self.reply_error(
                batch,
                format!("the `{}` field is not a non-negative integer", self.fields.count),
            ),
            None => self.reply_error(batch, format!("the `{}` field is missing", self.fields.count)),
        }
    }

    fn collect_write_errors(&mut self, batch: usize, reply: &Document, index_map: &BatchIndexMap) {
        let entries = match reply.get(&self.fields.write_errors) {
            None | Some(Bson::Null) => return,
            Some(Bson::Array(entries)) => entries,
            Some(_) => {
                let message = format!("the `{}` field is not an array", self.fields.write_errors);
                self.reply_error(batch, message);
                return;
            }
        };

        for entry in entries {
            let Some(entry) = entry.as_document() else {
                let message = format!("a `{}` entry is not a document", self.fields.write_errors);
                self.reply_error(batch, message);
                continue;
            };

            let index = match entry.get(&self.fields.index) {
                Some(index) => self.remap(batch, index, index_map),
                None => Err(format!(
                    "a `{}` entry has no `{}` field",
                    self.fields.write_errors, self.fields.index
                )),
            };
            match index {
                Ok(index) => {
                    let error = IndexedWriteError {
                        index,
                        code: self.code(entry).unwrap_or(UNKNOWN_ERROR_CODE),
                        code_name: self.code_name(entry),
                        message: self.message(entry),
                        details: self.details(entry),
                    };
                    self.result.write_errors.push(error);
                }
                Err(message) => self.reply_error(batch, message),
            }
        }
    }

    fn collect_write_concern_errors(
        &mut self,
        batch: usize,
        reply: &Document,
        index_map: &BatchIndexMap,
    ) {
        let entries: Vec<&Bson> = match reply.get(&self.fields.write_concern_error) {
            None | Some(Bson::Null) => return,
            Some(Bson::Array(entries)) => entries.iter().collect(),
            Some(entry) => vec![entry],
        };

        for entry in entries {
            let Some(entry) = entry.as_document() else {
                let message = format!(
                    "a `{}` entry is not a document",
                    self.fields.write_concern_error
                );
                self.reply_error(batch, message);
                continue;
            };

            let index = match entry.get(&self.fields.index) {
                None | Some(Bson::Null) => Ok(None),
                Some(index) => self.remap(batch, index, index_map).map(Some),
            };
            match index {
                Ok(index) => {
                    let error = IndexedWriteConcernError {
                        index,
                        code: self.code(entry).unwrap_or(UNKNOWN_ERROR_CODE),
                        code_name: self.code_name(entry),
                        message: self.message(entry),
                        details: self.details(entry),
                    };
                    self.result.write_concern_errors.push(error);
                }
                Err(message) => self.reply_error(batch, message),
            }
        }
    }

    /// Legacy replies report at most one error, which is attributed to the first document of the
    /// batch.
    fn collect_legacy_error(&mut self, batch: usize, reply: &Document, index_map: &BatchIndexMap) {
        if !ReplyVariant::Legacy.reports_failure(reply, self.fields) {
            return;
        }

        let Some(index) = index_map.get(0) else {
            self.reply_error(batch, "the reply reports an error but its batch is empty");
            return;
        };

        let err = reply.get_str(&self.fields.err).ok();
        let note = reply
            .get_str(&self.fields.wnote)
            .or_else(|_| reply.get_str(&self.fields.jnote))
            .ok();
        let explicit_code = self.code(reply);

        if let Some(note) = note {
            let code = explicit_code.unwrap_or(BAD_VALUE_CODE);
            self.result.write_concern_errors.push(IndexedWriteConcernError {
                index: Some(index),
                code,
                code_name: self.code_name(reply),
                message: format!("{code}: {note}"),
                details: None,
            });
        } else if let Some(timeout @ "timeout") = err {
            let code = explicit_code.unwrap_or(UNKNOWN_ERROR_CODE);
            self.result.write_concern_errors.push(IndexedWriteConcernError {
                index: Some(index),
                code,
                code_name: self.code_name(reply),
                message: format!("{code}: {timeout}"),
                details: None,
            });
        } else {
            let message = err
                .or_else(|| reply.get_str(&self.fields.errmsg).ok())
                .unwrap_or_default()
                .to_string();
            self.result.write_errors.push(IndexedWriteError {
                index,
                code: explicit_code.unwrap_or(UNKNOWN_ERROR_CODE),
                code_name: self.code_name(reply),
                message,
                details: None,
            });
        }
    }

    fn remap(
        &self,
        batch: usize,
        index: &Bson,
        index_map: &BatchIndexMap,
    ) -> std::result::Result<usize, String> {
        let batch_index = bson_util::get_u64(index)
            .and_then(|index| usize::try_from(index).ok())
            .ok_or_else(|| format!("invalid `{}` value in batch {batch}: {index}", self.fields.index))?;

        index_map.get(batch_index).ok_or_else(|| {
            format!(
                "index {batch_index} is outside of the batch of {} documents",
                index_map.len()
            )
        })
    }

    fn code(&self, entry: &Document) -> Option<i32> {
        entry
            .get(&self.fields.code)
            .and_then(bson_util::get_int)
            .and_then(|code| i32::try_from(code).ok())
    }

    fn code_name(&self, entry: &Document) -> Option<String> {
        entry.get_str(&self.fields.code_name).ok().map(String::from)
    }

    fn message(&self, entry: &Document) -> String {
        entry
            .get_str(&self.fields.errmsg)
            .unwrap_or_default()
            .to_string()
    }

    fn details(&self, entry: &Document) -> Option<Document> {
        entry.get_document(&self.fields.err_info).ok().cloned()
    }

    fn reply_error(&mut self, batch: usize, message: impl Into<String>) {
        self.result.reply_errors.push(ReplyError::new(batch, message));
    }

    fn finish(mut self) -> WriteResult {
        // Stable sorts keep errors reported for the same document in reply order.
        self.result.write_errors.sort_by_key(|error| error.index);
        self.result
            .write_concern_errors
            .sort_by_key(|error| (error.index.is_none(), error.index));
        self.result
    }
}
