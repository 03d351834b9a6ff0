//! Initial migration to create the catalog tables

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
	async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
		manager
			.create_table(
				Table::create()
					.table(Sections::Table)
					.if_not_exists()
					.col(ColumnDef::new(Sections::Name).string().not_null().primary_key())
					.col(ColumnDef::new(Sections::Path).json().not_null())
					.col(ColumnDef::new(Sections::Filters).json().not_null())
					.col(ColumnDef::new(Sections::Converters).string().not_null())
					.col(ColumnDef::new(Sections::ReadOnly).boolean().not_null().default(false))
					.col(ColumnDef::new(Sections::Recursive).boolean().not_null().default(true))
					.to_owned(),
			)
			.await?;

		manager
			.create_table(
				Table::create()
					.table(Tags::Table)
					.if_not_exists()
					.col(ColumnDef::new(Tags::Guid).uuid().not_null().primary_key())
					.col(ColumnDef::new(Tags::Name).string().not_null())
					.col(ColumnDef::new(Tags::Vts).string().not_null())
					.col(ColumnDef::new(Tags::Section).string().not_null())
					.foreign_key(
						ForeignKey::create()
							.from(Tags::Table, Tags::Section)
							.to(Sections::Table, Sections::Name)
							.on_delete(ForeignKeyAction::Cascade),
					)
					.to_owned(),
			)
			.await?;

		manager
			.create_index(
				Index::create()
					.name("idx_tags_section")
					.table(Tags::Table)
					.col(Tags::Section)
					.to_owned(),
			)
			.await?;

		manager
			.create_index(
				Index::create()
					.name("idx_tags_vts")
					.table(Tags::Table)
					.col(Tags::Vts)
					.to_owned(),
			)
			.await?;

		manager
			.create_table(
				Table::create()
					.table(DeletedTags::Table)
					.if_not_exists()
					.col(ColumnDef::new(DeletedTags::Guid).uuid().not_null().primary_key())
					.col(ColumnDef::new(DeletedTags::Name).string().not_null())
					.col(ColumnDef::new(DeletedTags::Vts).string().not_null())
					.col(ColumnDef::new(DeletedTags::Section).string().not_null())
					.to_owned(),
			)
			.await?;

		manager
			.create_index(
				Index::create()
					.name("idx_deleted_tags_vts")
					.table(DeletedTags::Table)
					.col(DeletedTags::Vts)
					.to_owned(),
			)
			.await?;

		manager
			.create_table(
				Table::create()
					.table(DirtyTags::Table)
					.if_not_exists()
					.col(ColumnDef::new(DirtyTags::Guid).uuid().not_null().primary_key())
					.to_owned(),
			)
			.await?;

		manager
			.create_table(
				Table::create()
					.table(AuditLogs::Table)
					.if_not_exists()
					.col(
						ColumnDef::new(AuditLogs::Id)
							.integer()
							.not_null()
							.auto_increment()
							.primary_key(),
					)
					.col(ColumnDef::new(AuditLogs::Level).string().not_null())
					.col(ColumnDef::new(AuditLogs::Message).string().not_null())
					.col(ColumnDef::new(AuditLogs::CreatedAt).timestamp_with_time_zone().not_null())
					.to_owned(),
			)
			.await?;

		Ok(())
	}

	async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
		manager
			.drop_table(Table::drop().table(AuditLogs::Table).to_owned())
			.await?;
		manager
			.drop_table(Table::drop().table(DirtyTags::Table).to_owned())
			.await?;
		manager
			.drop_table(Table::drop().table(DeletedTags::Table).to_owned())
			.await?;
		manager
			.drop_table(Table::drop().table(Tags::Table).to_owned())
			.await?;
		manager
			.drop_table(Table::drop().table(Sections::Table).to_owned())
			.await?;
		Ok(())
	}
}

#[derive(DeriveIden)]
enum Sections {
	Table,
	Name,
	Path,
	Filters,
	Converters,
	ReadOnly,
	Recursive,
}

#[derive(DeriveIden)]
enum Tags {
	Table,
	Guid,
	Name,
	Vts,
	Section,
}

#[derive(DeriveIden)]
enum DeletedTags {
	Table,
	Guid,
	Name,
	Vts,
	Section,
}

#[derive(DeriveIden)]
enum DirtyTags {
	Table,
	Guid,
}

#[derive(DeriveIden)]
enum AuditLogs {
	Table,
	Id,
	Level,
	Message,
	CreatedAt,
}
