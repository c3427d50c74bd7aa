//! Default and temporary tablespace choice
//!
//! `default_tablespace` and `temp_tablespaces` are session settings; the
//! resolved temp list lives on the transaction and is rebuilt lazily by the
//! first temporary allocation after each transaction boundary.

use crate::session::{split_identifier_string, GucSource, Session};
use crate::tablespace::{current_txn, TablespaceError, TablespaceManager, TablespaceResult};
use crate::types::{Persistence, TablespaceId, INVALID_OID};
use crate::xact::TempTablespaces;

impl TablespaceManager {
    /// Tablespace for a new object of `persistence` when none was named
    ///
    /// [`INVALID_OID`] means the database default.
    pub fn get_default_tablespace(
        &self,
        session: &mut Session,
        persistence: Persistence,
    ) -> TablespaceResult<TablespaceId> {
        self.execute(session, |mgr, s| mgr.default_tablespace_in_txn(s, persistence))
    }

    /// Resolve `temp_tablespaces` for the current transaction
    pub fn prepare_temp_tablespaces(&self, session: &mut Session) -> TablespaceResult<()> {
        self.execute(session, |mgr, s| mgr.prepare_temp_in_txn(s))
    }

    /// Next temporary tablespace in round-robin order
    pub fn get_next_temp_tablespace(&self, session: &mut Session) -> TablespaceResult<TablespaceId> {
        self.execute(session, |mgr, s| mgr.next_temp_in_txn(s))
    }

    pub(crate) fn default_tablespace_in_txn(
        &self,
        session: &mut Session,
        persistence: Persistence,
    ) -> TablespaceResult<TablespaceId> {
        if persistence == Persistence::Temporary {
            return self.next_temp_in_txn(session);
        }

        if session.settings.default_tablespace.is_empty() {
            return Ok(INVALID_OID);
        }

        // a vanished setting falls back silently
        let name = session.settings.default_tablespace.clone();
        let id = self.lookup_tablespace(session, &name, true)?;
        if id == session.database_tablespace {
            return Ok(INVALID_OID);
        }
        Ok(id)
    }

    fn next_temp_in_txn(&self, session: &mut Session) -> TablespaceResult<TablespaceId> {
        self.prepare_temp_in_txn(session)?;
        let txn = current_txn(session)?;
        Ok(txn
            .temp_tablespaces
            .as_mut()
            .map_or(INVALID_OID, TempTablespaces::next_id))
    }

    fn prepare_temp_in_txn(&self, session: &mut Session) -> TablespaceResult<()> {
        if current_txn(session)?.temp_tablespaces.is_some() {
            return Ok(());
        }

        let raw = session.settings.temp_tablespaces.clone();
        let Some(names) = split_identifier_string(&raw) else {
            log::debug!("invalid temp_tablespaces \"{}\", using none", raw);
            current_txn(session)?.temp_tablespaces = Some(TempTablespaces::new(Vec::new()));
            return Ok(());
        };

        let mut ids = Vec::with_capacity(names.len());
        for name in names {
            if name.is_empty() {
                ids.push(INVALID_OID);
                continue;
            }

            let id = match self.lookup_tablespace(session, &name, true)? {
                INVALID_OID => {
                    session.notice(format!("tablespace \"{}\" does not exist, skipping", name));
                    continue;
                }
                id => id,
            };
            if id == session.database_tablespace {
                ids.push(INVALID_OID);
                continue;
            }
            if !self.may_create_in(session, id)? {
                session.notice(format!("permission denied for tablespace {}, skipping", name));
                continue;
            }
            ids.push(id);
        }

        log::debug!("temp tablespaces resolved to {:?}", ids);
        current_txn(session)?.temp_tablespaces = Some(TempTablespaces::new(ids));
        Ok(())
    }

    /// `SET default_tablespace`
    pub fn set_default_tablespace(
        &self,
        session: &mut Session,
        value: &str,
        source: GucSource,
    ) -> TablespaceResult<()> {
        if !value.is_empty() {
            let exists = self.execute(session, |mgr, s| {
                mgr.lookup_tablespace(s, value, true).map(|id| id != INVALID_OID)
            })?;
            if !exists {
                let message = format!("tablespace \"{}\" does not exist", value);
                if source != GucSource::Test {
                    return Err(TablespaceError::InvalidParameter(message));
                }
                session.notice(message);
            }
        }
        session.settings.default_tablespace = value.to_string();
        Ok(())
    }

    /// `SET temp_tablespaces`
    ///
    /// The resolved list replaces the one of the open transaction.
    pub fn set_temp_tablespaces(
        &self,
        session: &mut Session,
        value: &str,
        source: GucSource,
    ) -> TablespaceResult<()> {
        let names = split_identifier_string(value).ok_or_else(|| {
            TablespaceError::InvalidParameter("List syntax is invalid.".to_string())
        })?;

        let ids = self.execute(session, |mgr, s| {
            let mut ids = Vec::with_capacity(names.len());
            for name in &names {
                if name.is_empty() {
                    ids.push(INVALID_OID);
                    continue;
                }

                let id = mgr.lookup_tablespace(s, name, source <= GucSource::Test)?;
                if id == INVALID_OID {
                    if source == GucSource::Test {
                        s.notice(format!("tablespace \"{}\" does not exist", name));
                    }
                    continue;
                }
                if id == s.database_tablespace {
                    ids.push(INVALID_OID);
                    continue;
                }
                if !mgr.may_create_in(s, id)? {
                    if source >= GucSource::Interactive {
                        return Err(TablespaceError::PermissionDenied(format!(
                            "permission denied for tablespace {}",
                            name
                        )));
                    }
                    continue;
                }
                ids.push(id);
            }
            Ok(ids)
        })?;

        session.settings.temp_tablespaces = value.to_string();
        if let Some(txn) = session.txn.as_mut() {
            txn.temp_tablespaces = Some(TempTablespaces::new(ids));
        }
        Ok(())
    }

    fn may_create_in(&self, session: &mut Session, id: TablespaceId) -> TablespaceResult<bool> {
        let role = session.role;
        let txn = current_txn(session)?;
        Ok(self
            .tablespaces
            .get(&txn.tablespaces, id)
            .is_some_and(|row| self.has_create_privilege(role, &row)))
    }
}
