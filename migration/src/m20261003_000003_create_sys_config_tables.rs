use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

fn key(col: impl IntoIden) -> ColumnDef {
    ColumnDef::new(col).string().not_null().to_owned()
}

fn text(col: impl IntoIden) -> ColumnDef {
    ColumnDef::new(col).string().null().to_owned()
}

fn number(col: impl IntoIden) -> ColumnDef {
    ColumnDef::new(col).integer().null().to_owned()
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        use SysConfigDatasetInfo as D;
        manager
            .create_table(
                Table::create()
                    .table(D::Table)
                    .if_not_exists()
                    .col(&mut key(D::SrcNm))
                    .col(&mut key(D::DatasetNm))
                    .col(&mut text(D::DatasetDesc))
                    .col(&mut text(D::TrgtDwList))
                    .col(&mut text(D::CmputWhseNm))
                    .col(&mut text(D::ServNowPriortyCd))
                    .col(&mut text(D::LoadEnblFlg))
                    .col(&mut text(D::ManlUpldFlg))
                    .col(&mut text(D::WhseLoadEnblFlg))
                    .col(&mut text(D::ActvFlg))
                    .primary_key(Index::create().col(D::SrcNm).col(D::DatasetNm))
                    .to_owned(),
            )
            .await?;

        use SysConfigPreProcInfo as P;
        manager
            .create_table(
                Table::create()
                    .table(P::Table)
                    .if_not_exists()
                    .col(&mut key(P::SrcNm))
                    .col(&mut key(P::DatasetNm))
                    .col(&mut text(P::FmtTypeCd))
                    .col(&mut text(P::HdrRowCnt))
                    .col(&mut text(P::TrlrRowCnt))
                    .col(&mut text(P::EncdngCd))
                    .col(&mut text(P::CmprsnCd))
                    .col(&mut text(P::ActvFlg))
                    .primary_key(Index::create().col(P::SrcNm).col(P::DatasetNm))
                    .to_owned(),
            )
            .await?;

        use SysConfigTableInfo as T;
        manager
            .create_table(
                Table::create()
                    .table(T::Table)
                    .if_not_exists()
                    .col(&mut key(T::SrcNm))
                    .col(&mut text(T::DomnNm))
                    .col(&mut key(T::DatasetNm))
                    .col(&mut text(T::RedshiftTableNm))
                    .col(&mut key(T::SrcTableNm))
                    .col(&mut text(T::DataClasfctnNm))
                    .col(&mut text(T::FmtTypeCd))
                    .col(&mut text(T::DelmtrCd))
                    .col(&mut text(T::FilePatrnTxt))
                    .col(&mut text(T::DprctMethdCd))
                    .col(&mut text(T::LoadTypeCd))
                    .col(&mut text(T::ActvFlg))
                    .primary_key(
                        Index::create()
                            .col(T::SrcNm)
                            .col(T::DatasetNm)
                            .col(T::SrcTableNm),
                    )
                    .to_owned(),
            )
            .await?;

        use SysConfigTableFieldInfo as F;
        manager
            .create_table(
                Table::create()
                    .table(F::Table)
                    .if_not_exists()
                    .col(&mut key(F::SrcNm))
                    .col(&mut key(F::SrcTableNm))
                    .col(&mut key(F::FieldNm))
                    .col(&mut number(F::FieldPosnNbr))
                    .col(&mut text(F::DatatypeNm))
                    .col(&mut number(F::DatatypeSizeVal))
                    .col(&mut number(F::DatatypeScaleVal))
                    .col(&mut text(F::KeyInd))
                    .col(&mut text(F::CheckTable))
                    .col(&mut text(F::FieldDesc))
                    .col(&mut text(F::DprctInd))
                    .col(&mut text(F::PartitnInd))
                    .col(&mut text(F::SortKeyInd))
                    .col(&mut text(F::DistKeyInd))
                    .col(&mut text(F::ProcStageCd))
                    .col(&mut text(F::CatlgFlg))
                    .col(&mut text(F::DblqtReplFlg))
                    .col(&mut text(F::DeltaKeyInd))
                    .primary_key(
                        Index::create()
                            .col(F::SrcNm)
                            .col(F::SrcTableNm)
                            .col(F::FieldNm),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(SysConfigTableFieldInfo::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(SysConfigTableInfo::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(SysConfigPreProcInfo::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(SysConfigDatasetInfo::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum SysConfigDatasetInfo {
    Table,
    SrcNm,
    DatasetNm,
    DatasetDesc,
    TrgtDwList,
    CmputWhseNm,
    ServNowPriortyCd,
    LoadEnblFlg,
    ManlUpldFlg,
    WhseLoadEnblFlg,
    ActvFlg,
}

#[derive(Iden)]
enum SysConfigPreProcInfo {
    Table,
    SrcNm,
    DatasetNm,
    FmtTypeCd,
    HdrRowCnt,
    TrlrRowCnt,
    EncdngCd,
    CmprsnCd,
    ActvFlg,
}

#[derive(Iden)]
enum SysConfigTableInfo {
    Table,
    SrcNm,
    DomnNm,
    DatasetNm,
    RedshiftTableNm,
    SrcTableNm,
    DataClasfctnNm,
    FmtTypeCd,
    DelmtrCd,
    FilePatrnTxt,
    DprctMethdCd,
    LoadTypeCd,
    ActvFlg,
}

#[derive(Iden)]
enum SysConfigTableFieldInfo {
    Table,
    SrcNm,
    SrcTableNm,
    FieldNm,
    FieldPosnNbr,
    DatatypeNm,
    DatatypeSizeVal,
    DatatypeScaleVal,
    KeyInd,
    CheckTable,
    FieldDesc,
    DprctInd,
    PartitnInd,
    SortKeyInd,
    DistKeyInd,
    ProcStageCd,
    CatlgFlg,
    DblqtReplFlg,
    DeltaKeyInd,
}
