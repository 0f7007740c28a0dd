//! Singleton `UserProfile` read/update.

use rusqlite::params;

use crate::database::{models::UserProfile, DbPool};
use crate::error::OttoResult;

#[derive(Clone)]
pub struct ProfileRepository {
    pool: DbPool,
}

impl ProfileRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn get(&self) -> OttoResult<UserProfile> {
        let conn = self.pool.get()?;
        let profile = conn.query_row(
            "SELECT * FROM user_profile WHERE id = 1",
            [],
            UserProfile::from_row,
        )?;
        Ok(profile)
    }

    pub fn update(&self, profile: &UserProfile) -> OttoResult<()> {
        let conn = self.pool.get()?;
        conn.execute(
            "UPDATE user_profile SET
                timezone=?1, quiet_hours_start=?2, quiet_hours_end=?3, quiet_mode=?4,
                mute_until=?5, heartbeat_time_1=?6, heartbeat_time_2=?7, heartbeat_time_3=?8,
                heartbeat_cadence_minutes=?9, heartbeat_only_if_signal=?10,
                onboarded_at=?11, last_digest_at=?12, updated_at=?13
             WHERE id = 1",
            params![
                profile.timezone,
                profile.quiet_hours_start,
                profile.quiet_hours_end,
                profile.quiet_mode.as_str(),
                profile.mute_until,
                profile.heartbeat_time_1,
                profile.heartbeat_time_2,
                profile.heartbeat_time_3,
                profile.heartbeat_cadence_minutes,
                profile.heartbeat_only_if_signal as i64,
                profile.onboarded_at,
                profile.last_digest_at,
                profile.updated_at,
            ],
        )?;
        Ok(())
    }
}
