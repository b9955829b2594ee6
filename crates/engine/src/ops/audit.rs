use sea_orm::{QueryFilter, QueryOrder, prelude::*, sea_query::SimpleExpr};

use crate::{AccountLog, ResultEngine, account_logs};

use super::Engine;

impl Engine {
    /// Log entries of an account, oldest first.
    pub async fn logs_for_account(
        &self,
        admin_id: i64,
        account_id: i64,
    ) -> ResultEngine<Vec<AccountLog>> {
        self.require_admin(admin_id)?;
        self.logs(account_logs::Column::AccountId.eq(account_id)).await
    }

    /// Log entries of a user, oldest first.
    pub async fn logs_for_user(
        &self,
        admin_id: i64,
        user_id: i64,
    ) -> ResultEngine<Vec<AccountLog>> {
        self.require_admin(admin_id)?;
        self.logs(account_logs::Column::UserId.eq(user_id)).await
    }

    async fn logs(&self, condition: SimpleExpr) -> ResultEngine<Vec<AccountLog>> {
        account_logs::Entity::find()
            .filter(condition)
            .order_by_asc(account_logs::Column::ActionDate)
            .order_by_asc(account_logs::Column::Id)
            .all(&self.database)
            .await?
            .into_iter()
            .map(AccountLog::try_from)
            .collect()
    }
}
