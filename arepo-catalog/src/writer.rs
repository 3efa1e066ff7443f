// Copyright 2024 The arepo Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

// The dedicated writer thread. It owns the one `Connection` for the
// lifetime of the catalog; every other thread talks to it by sending a
// boxed closure plus capturing its own reply channel in the closure.
// Calling `submit` from the writer thread itself is a bug (a catalog
// callback calling back into the façade) and is rejected rather than
// deadlocked.

use std::path::PathBuf;
use std::sync::mpsc::{self, Sender};
use std::thread::{self, JoinHandle, ThreadId};

use rusqlite::Connection;

use arepo_common::{ArepoError, Result};

use crate::schema;

type Job = Box<dyn FnOnce(&mut Connection) + Send>;

pub struct Writer {
    tx: Option<Sender<Job>>,
    thread_id: ThreadId,
    handle: Option<JoinHandle<()>>,
}

impl Writer {
    pub fn open(db_path: PathBuf) -> Result<Self> {
        let (tx, rx) = mpsc::channel::<Job>();
        let (ready_tx, ready_rx) = mpsc::channel::<Result<ThreadId>>();

        let handle = thread::Builder::new()
            .name("arepo-catalog-writer".into())
            .spawn(move || {
                let mut conn = match schema::open_and_migrate(&db_path) {
                    Ok(conn) => conn,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(thread::current().id()));
                for job in rx {
                    job(&mut conn);
                }
                if let Err(e) = schema::checkpoint_and_close(conn) {
                    log::warn!("catalog shutdown checkpoint failed: {e}");
                }
            })
            .map_err(|e| ArepoError::Catalog(format!("failed to spawn writer thread: {e}")))?;

        let thread_id = ready_rx.recv().map_err(ArepoError::from)??;

        Ok(Writer { tx: Some(tx), thread_id, handle: Some(handle) })
    }

    pub fn submit<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        if thread::current().id() == self.thread_id {
            return Err(ArepoError::CatalogReentrant);
        }
        let (reply_tx, reply_rx) = mpsc::channel::<Result<T>>();
        let job: Job = Box::new(move |conn| {
            let result = f(conn);
            let _ = reply_tx.send(result);
        });
        self.tx
            .as_ref()
            .expect("writer channel only torn down in Drop")
            .send(job)
            .map_err(|_| ArepoError::Catalog("catalog writer thread has shut down".into()))?;
        reply_rx.recv().map_err(ArepoError::from)?
    }
}

impl Drop for Writer {
    fn drop(&mut self) {
        // Drop the sender first so the writer thread's `for job in rx`
        // loop observes the channel close and runs its checkpoint.
        self.tx.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
