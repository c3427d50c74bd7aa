//! Benchmark scenarios module

use aistore_tblspc::tablespace::{
    CreateRelationStmt, CreateTablespaceStmt, DropTablespaceStmt, MoveStmt, RenameStmt,
};
use aistore_tblspc::types::BOOTSTRAP_SUPERUSER_ID;
use aistore_tblspc::{Session, TablespaceManager};
use rand::rngs::StdRng;
use rand::Rng;
use rayon::prelude::*;
use std::error::Error;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

pub type BenchResult<T> = Result<T, Box<dyn Error + Send + Sync>>;

/// Database every benchmark session connects to
const BENCH_DB: u32 = 16384;

/// What a scenario runs against
pub struct BenchEnv {
    pub manager: TablespaceManager,
    pub locations: PathBuf,
    pub threads: usize,
}

impl BenchEnv {
    pub fn session(&self) -> Session {
        Session::new(BOOTSTRAP_SUPERUSER_ID, BENCH_DB)
    }

    /// Make sure `<locations>/<name>` exists and return it
    fn location(&self, name: &str) -> BenchResult<String> {
        let dir = self.locations.join(name);
        std::fs::create_dir_all(&dir)?;
        Ok(dir.display().to_string())
    }

    fn create(&self, session: &mut Session, name: &str) -> BenchResult<()> {
        let location = self.location(name)?;
        self.manager
            .create_tablespace(session, &CreateTablespaceStmt::new(name, location))?;
        Ok(())
    }
}

/// Scenario trait - defines a benchmark scenario
pub trait Scenario: Send + Sync {
    /// Set up tablespaces and relations before the clock starts
    fn prepare(&self, env: &BenchEnv) -> BenchResult<()>;

    /// Execute one iteration of the scenario
    fn execute(
        &self,
        env: &BenchEnv,
        session: &mut Session,
        thread_id: usize,
        rng: &mut StdRng,
    ) -> BenchResult<()>;
}

pub fn by_name(name: &str, objects: usize) -> Option<Box<dyn Scenario>> {
    let scenario: Box<dyn Scenario> = match name {
        "create_drop" => Box::new(CreateDrop::default()),
        "lookup" => Box::new(Lookup { tablespaces: objects }),
        "rename" => Box::new(Rename),
        "move" => Box::new(Move { relations: objects }),
        "temp_rotation" => Box::new(TempRotation { tablespaces: objects }),
        _ => return None,
    };
    Some(scenario)
}

/// Create a tablespace and drop it again
#[derive(Default)]
pub struct CreateDrop {
    counter: AtomicU64,
}

impl Scenario for CreateDrop {
    fn prepare(&self, env: &BenchEnv) -> BenchResult<()> {
        (0..env.threads)
            .into_par_iter()
            .try_for_each(|t| env.location(&format!("cd_{}", t)).map(|_| ()))
    }

    fn execute(
        &self,
        env: &BenchEnv,
        session: &mut Session,
        thread_id: usize,
        _rng: &mut StdRng,
    ) -> BenchResult<()> {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        let name = format!("cd_{}_{}", thread_id, n);
        let location = env.location(&format!("cd_{}", thread_id))?;
        env.manager
            .create_tablespace(session, &CreateTablespaceStmt::new(name.as_str(), location))?;
        env.manager.drop_tablespace(
            session,
            &DropTablespaceStmt {
                name,
                missing_ok: false,
            },
        )?;
        Ok(())
    }
}

/// Name to id lookups over a fixed set of tablespaces
pub struct Lookup {
    tablespaces: usize,
}

impl Scenario for Lookup {
    fn prepare(&self, env: &BenchEnv) -> BenchResult<()> {
        (0..self.tablespaces.max(1))
            .into_par_iter()
            .try_for_each(|i| env.create(&mut env.session(), &format!("lookup_{}", i)))
    }

    fn execute(
        &self,
        env: &BenchEnv,
        session: &mut Session,
        _thread_id: usize,
        rng: &mut StdRng,
    ) -> BenchResult<()> {
        let name = format!("lookup_{}", rng.gen_range(0..self.tablespaces.max(1)));
        env.manager.get_tablespace_oid(session, &name, false)?;
        Ok(())
    }
}

/// Rename a per-thread tablespace away and back
pub struct Rename;

impl Scenario for Rename {
    fn prepare(&self, env: &BenchEnv) -> BenchResult<()> {
        (0..env.threads)
            .into_par_iter()
            .try_for_each(|t| env.create(&mut env.session(), &format!("ren_{}", t)))
    }

    fn execute(
        &self,
        env: &BenchEnv,
        session: &mut Session,
        thread_id: usize,
        _rng: &mut StdRng,
    ) -> BenchResult<()> {
        let name = format!("ren_{}", thread_id);
        let other = format!("ren_{}_away", thread_id);
        for (old_name, new_name) in [(&name, &other), (&other, &name)] {
            env.manager.rename_tablespace(
                session,
                &RenameStmt {
                    old_name: old_name.clone(),
                    new_name: new_name.clone(),
                },
            )?;
        }
        Ok(())
    }
}

/// Shuttle a thread's relations between two tablespaces
pub struct Move {
    relations: usize,
}

impl Scenario for Move {
    fn prepare(&self, env: &BenchEnv) -> BenchResult<()> {
        (0..env.threads).into_par_iter().try_for_each(|t| {
            let mut session = env.session();
            env.create(&mut session, &format!("mv_a_{}", t))?;
            env.create(&mut session, &format!("mv_b_{}", t))?;
            for k in 0..self.relations.max(1) {
                let stmt = CreateRelationStmt::table(format!("mv_{}_{}", t, k))
                    .tablespace(format!("mv_a_{}", t));
                env.manager.create_relation(&mut session, &stmt)?;
                env.manager
                    .insert_rows(&mut session, &stmt.name, &[[0u8; 512].as_slice()])?;
            }
            Ok(())
        })
    }

    fn execute(
        &self,
        env: &BenchEnv,
        session: &mut Session,
        thread_id: usize,
        _rng: &mut StdRng,
    ) -> BenchResult<()> {
        let a = format!("mv_a_{}", thread_id);
        let b = format!("mv_b_{}", thread_id);
        env.manager
            .alter_tablespace_move(session, &MoveStmt::new(a.as_str(), b.as_str()))?;
        env.manager
            .alter_tablespace_move(session, &MoveStmt::new(b, a))?;
        Ok(())
    }
}

/// Resolve temp_tablespaces and draw from it inside one transaction
pub struct TempRotation {
    tablespaces: usize,
}

impl TempRotation {
    const DRAWS: usize = 16;

    fn setting(&self) -> String {
        (0..self.tablespaces.max(1))
            .map(|i| format!("temp_{}", i))
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl Scenario for TempRotation {
    fn prepare(&self, env: &BenchEnv) -> BenchResult<()> {
        (0..self.tablespaces.max(1))
            .into_par_iter()
            .try_for_each(|i| env.create(&mut env.session(), &format!("temp_{}", i)))
    }

    fn execute(
        &self,
        env: &BenchEnv,
        session: &mut Session,
        _thread_id: usize,
        _rng: &mut StdRng,
    ) -> BenchResult<()> {
        if session.settings.temp_tablespaces.is_empty() {
            session.settings.temp_tablespaces = self.setting();
        }
        env.manager.begin(session)?;
        for _ in 0..Self::DRAWS {
            env.manager.get_next_temp_tablespace(session)?;
        }
        env.manager.commit(session)?;
        Ok(())
    }
}
