//! Scrollable results and result streams.

use std::sync::Arc;

use super::cursor::LiveCursor;
use super::follow_on::FollowOnLocker;
use super::jdbc::Connection;
use crate::error::Error;
use crate::results::{FetchMerger, ResultValue, RowReader, RowTransformer};

/// A cursor over transformed rows.
///
/// Plain results navigate the underlying result set freely, as far as the
/// scroll mode allows. Results that fetch collections merge consecutive rows
/// of the same entity and only move forward: whatever the scroll mode,
/// [`previous`](Self::previous), [`first`](Self::first), [`last`](Self::last)
/// and [`absolute`](Self::absolute) fail with [`Error::Unsupported`] when
/// [`is_fetching`](Self::is_fetching) is true.
pub struct ScrollableResults<R> {
    cursor: LiveCursor,
    reader: RowReader,
    transformer: Arc<dyn RowTransformer<R>>,
    connection: Arc<dyn Connection>,
    follow_on: Option<FollowOnLocker>,
    merger: Option<FetchMerger>,
    exhausted: bool,
    current: Option<R>,
}

impl<R> ScrollableResults<R> {
    pub(crate) fn new(
        cursor: LiveCursor,
        reader: RowReader,
        transformer: Arc<dyn RowTransformer<R>>,
        connection: Arc<dyn Connection>,
        follow_on: Option<FollowOnLocker>,
        fetching: bool,
    ) -> Self {
        Self {
            cursor,
            reader,
            transformer,
            connection,
            follow_on,
            merger: fetching.then(FetchMerger::new),
            exhausted: false,
            current: None,
        }
    }

    /// Whether rows are merged per entity because collections are fetched.
    pub fn is_fetching(&self) -> bool {
        self.merger.is_some()
    }

    /// Move to the next row. Returns `false` past the last row and once closed.
    pub fn next(&mut self) -> Result<bool, Error> {
        if self.cursor.is_closed() {
            return Ok(false);
        }
        let result = if self.merger.is_some() {
            self.next_merged()
                .and_then(|row| self.set_current(row))
        } else {
            self.cursor.next().and_then(|moved| self.load_current(moved))
        };
        result.map_err(|e| Error::row_processing(self.cursor.sql(), e))
    }

    /// Move back one row. Unsupported when collections are fetched.
    pub fn previous(&mut self) -> Result<bool, Error> {
        self.reposition("previous", |cursor| cursor.previous())
    }

    pub fn first(&mut self) -> Result<bool, Error> {
        self.reposition("first", |cursor| cursor.first())
    }

    pub fn last(&mut self) -> Result<bool, Error> {
        self.reposition("last", |cursor| cursor.last())
    }

    /// Move to the 1-based `row`; negative values count from the end.
    /// Unsupported when collections are fetched.
    pub fn absolute(&mut self, row: i64) -> Result<bool, Error> {
        self.reposition("absolute", |cursor| cursor.absolute(row))
    }

    /// 1-based number of the current row, when the backend reports it.
    pub fn row_number(&self) -> Result<Option<usize>, Error> {
        self.cursor.row_number()
    }

    /// The current row.
    pub fn get(&self) -> Option<&R> {
        self.current.as_ref()
    }

    pub(crate) fn take_current(&mut self) -> Option<R> {
        self.current.take()
    }

    /// Release the result set and statement. Further navigation yields nothing.
    pub fn close(&mut self) -> Result<(), Error> {
        self.current = None;
        self.cursor.close()
    }

    pub fn is_closed(&self) -> bool {
        self.cursor.is_closed()
    }

    /// Any move other than `next`. Merged rows span several result set rows,
    /// so there is no result set position to return to.
    fn reposition(
        &mut self,
        operation: &str,
        op: impl FnOnce(&mut LiveCursor) -> Result<bool, Error>,
    ) -> Result<bool, Error> {
        if self.merger.is_some() {
            return Err(Error::Unsupported(format!(
                "{operation} on results that fetch collections"
            )));
        }
        if self.cursor.is_closed() {
            return Ok(false);
        }
        op(&mut self.cursor)
            .and_then(|moved| self.load_current(moved))
            .map_err(|e| Error::row_processing(self.cursor.sql(), e))
    }

    fn load_current(&mut self, positioned: bool) -> Result<bool, Error> {
        if !positioned {
            self.current = None;
            return Ok(false);
        }
        let row = self.read_current()?;
        self.set_current(Some(row))
    }

    fn set_current(&mut self, row: Option<Vec<ResultValue>>) -> Result<bool, Error> {
        self.current = match row {
            Some(row) => {
                let reduced = self.reader.reduce(row);
                Some(
                    self.transformer
                        .transform_row(reduced, self.reader.user_aliases())?,
                )
            }
            None => None,
        };
        Ok(self.current.is_some())
    }

    fn read_current(&mut self) -> Result<Vec<ResultValue>, Error> {
        let raw = self.cursor.current_row()?;
        if let Some(locker) = self.follow_on.as_mut() {
            locker.lock_row(self.connection.as_ref(), &raw)?;
        }
        self.reader.read_row(&raw)
    }

    fn next_merged(&mut self) -> Result<Option<Vec<ResultValue>>, Error> {
        loop {
            if self.exhausted {
                return Ok(self.merger.as_mut().and_then(FetchMerger::finish));
            }
            if !self.cursor.next()? {
                self.exhausted = true;
                continue;
            }
            let row = self.read_current()?;
            if let Some(completed) = self.merger.as_mut().and_then(|m| m.push(row)) {
                return Ok(Some(completed));
            }
        }
    }
}

impl<R> std::fmt::Debug for ScrollableResults<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScrollableResults")
            .field("cursor", &self.cursor)
            .field("fetching", &self.is_fetching())
            .finish_non_exhaustive()
    }
}

/// A one-shot, forward-only sequence of transformed rows.
///
/// The cursor is closed exactly once: when the last row has been read, when
/// reading fails, on [`ResultStream::close`], or when the stream is dropped.
/// A closed stream yields nothing more and cannot be restarted.
pub struct ResultStream<R> {
    results: ScrollableResults<R>,
    done: bool,
}

impl<R> ResultStream<R> {
    pub(crate) fn new(results: ScrollableResults<R>) -> Self {
        Self {
            results,
            done: false,
        }
    }

    /// Stop reading and release the cursor.
    pub fn close(&mut self) -> Result<(), Error> {
        self.done = true;
        self.results.close()
    }

    pub fn is_closed(&self) -> bool {
        self.results.is_closed()
    }
}

impl<R> Iterator for ResultStream<R> {
    type Item = Result<R, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.results.next() {
            Ok(true) => match self.results.take_current() {
                Some(row) => Some(Ok(row)),
                None => self.close().err().map(Err),
            },
            Ok(false) => self.close().err().map(Err),
            Err(e) => {
                self.done = true;
                // The read error is the one worth reporting.
                let _ = self.results.close();
                Some(Err(e))
            }
        }
    }
}

impl<R> std::fmt::Debug for ResultStream<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultStream")
            .field("results", &self.results)
            .field("done", &self.done)
            .finish()
    }
}
